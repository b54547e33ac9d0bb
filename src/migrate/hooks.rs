//! Hook phases around migration DDL execution.
//!
//! Hooks are SQL statement lists tagged with a phase. Within a phase they
//! run sequentially; a failure aborts the phase and everything after it.
//! ON_ERROR hooks run after rollback and their failures are logged, never
//! raised, so they cannot mask the original error.

use tracing::{debug, error};

use crate::error::ConfitureError;
use crate::migrate::Db;

/// Execution phase of a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    BeforeValidation,
    BeforeDdl,
    AfterDdl,
    AfterValidation,
    Cleanup,
    OnError,
}

impl std::fmt::Display for HookPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookPhase::BeforeValidation => write!(f, "BEFORE_VALIDATION"),
            HookPhase::BeforeDdl => write!(f, "BEFORE_DDL"),
            HookPhase::AfterDdl => write!(f, "AFTER_DDL"),
            HookPhase::AfterValidation => write!(f, "AFTER_VALIDATION"),
            HookPhase::Cleanup => write!(f, "CLEANUP"),
            HookPhase::OnError => write!(f, "ON_ERROR"),
        }
    }
}

/// A list of SQL statements bound to one phase.
#[derive(Debug, Clone)]
pub struct Hook {
    pub phase: HookPhase,
    pub statements: Vec<String>,
}

impl Hook {
    pub fn new(phase: HookPhase, statements: Vec<String>) -> Self {
        Self { phase, statements }
    }
}

/// Direction of the run the hooks belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Context handed to every hook execution (for logging).
#[derive(Debug, Clone)]
pub struct HookContext {
    pub migration_version: String,
    pub migration_name: String,
    pub direction: Direction,
}

/// Executes hooks for a phase in declaration order.
#[derive(Debug, Default)]
pub struct HookExecutor;

impl HookExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run every hook bound to `phase`. The first failure aborts.
    pub fn execute_phase(
        &self,
        db: &mut Db,
        phase: HookPhase,
        hooks: &[Hook],
        context: &HookContext,
    ) -> Result<(), ConfitureError> {
        for hook in hooks.iter().filter(|h| h.phase == phase) {
            for statement in &hook.statements {
                debug!(
                    phase = %phase,
                    version = %context.migration_version,
                    "executing hook statement"
                );
                db.execute(statement).map_err(|e| {
                    ConfitureError::migration_for(
                        format!(
                            "{} hook failed for migration {}: {}",
                            phase, context.migration_version, e
                        ),
                        &context.migration_version,
                        &context.migration_name,
                    )
                })?;
            }
        }
        Ok(())
    }

    /// Run ON_ERROR hooks; failures are logged and swallowed so they never
    /// mask the original migration error.
    pub fn execute_on_error(
        &self,
        db: &mut Db,
        hooks: &[Hook],
        context: &HookContext,
    ) -> usize {
        let mut failures = 0;
        for hook in hooks.iter().filter(|h| h.phase == HookPhase::OnError) {
            for statement in &hook.statements {
                if let Err(e) = db.execute(statement) {
                    error!(
                        version = %context.migration_version,
                        "ON_ERROR hook failed: {}",
                        e
                    );
                    failures += 1;
                }
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(HookPhase::BeforeValidation.to_string(), "BEFORE_VALIDATION");
        assert_eq!(HookPhase::OnError.to_string(), "ON_ERROR");
    }

    #[test]
    fn test_hook_construction() {
        let hook = Hook::new(
            HookPhase::AfterDdl,
            vec!["UPDATE tb_read_model SET dirty = true".to_string()],
        );
        assert_eq!(hook.phase, HookPhase::AfterDdl);
        assert_eq!(hook.statements.len(), 1);
    }
}
