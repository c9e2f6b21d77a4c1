//! Execution engine - converges entities one at a time, in plan order

use crate::context::ProgressCallback;
use crate::error::Result;
use crate::planner::ConvergencePlan;
use crate::resource::Entity;
use crate::types::{ApplyResult, ExecuteOptions, ExecuteSummary};

/// Execute a plan against the given run context
///
/// Each entity is validated, planned and then applied change by change.
/// The first failure stops the run: changes already applied stay applied
/// and the error is returned after the progress callback has seen it.
///
/// On a dry run entities are validated and planned, but nothing is applied;
/// entities with pending changes are reported as skipped.
pub fn execute<C, P>(
    plan: &ConvergencePlan<C>,
    ctx: &C,
    opts: &ExecuteOptions,
    progress: &mut P,
) -> Result<ExecuteSummary>
where
    C: ?Sized,
    P: ProgressCallback,
{
    let mut summary = ExecuteSummary::default();

    for entity in plan.iter() {
        let id = entity.id();
        progress.on_entity_start(&id, &entity.description());

        let result = match converge(entity.as_ref(), ctx, opts, progress) {
            Ok((result, count)) => {
                summary.changes += count;
                result
            }
            Err(e) => {
                let failed = ApplyResult::Failed {
                    error: e.to_string(),
                };
                summary.add_result(&failed);
                progress.on_entity_complete(&id, &failed);
                return Err(e);
            }
        };

        summary.add_result(&result);
        progress.on_entity_complete(&id, &result);
    }

    Ok(summary)
}

/// Converge a single entity, returning its result and change count
fn converge<C, P>(
    entity: &dyn Entity<C>,
    ctx: &C,
    opts: &ExecuteOptions,
    progress: &mut P,
) -> Result<(ApplyResult, usize)>
where
    C: ?Sized,
    P: ProgressCallback,
{
    let id = entity.id();
    entity.validate(ctx)?;

    let changes = entity.plan(ctx)?;
    if changes.is_empty() {
        log::debug!("{} {} is up to date", entity.entity_type(), id);
        return Ok((ApplyResult::NoChange, 0));
    }

    for change in &changes {
        progress.on_change(&id, change);
        if opts.dry_run {
            continue;
        }
        log::info!("{} {}: {}", entity.entity_type(), id, change);
        entity.apply(change, ctx)?;
    }

    if opts.dry_run {
        return Ok((
            ApplyResult::Skipped {
                reason: "dry run".into(),
            },
            changes.len(),
        ));
    }

    Ok((ApplyResult::from_changes(&changes), changes.len()))
}

/// Simple execution without progress reporting
pub fn execute_simple<C: ?Sized>(
    plan: &ConvergencePlan<C>,
    ctx: &C,
    opts: &ExecuteOptions,
) -> Result<ExecuteSummary> {
    use crate::context::NoProgress;

    execute(plan, ctx, opts, &mut NoProgress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::Change;
    use std::cell::RefCell;

    /// Records every applied change
    #[derive(Default)]
    struct Log {
        applied: RefCell<Vec<String>>,
    }

    #[derive(Debug)]
    struct TestEntity {
        id: &'static str,
        changes: Vec<Change>,
        invalid: bool,
        fail_on: Option<usize>,
    }

    impl TestEntity {
        fn new(id: &'static str, changes: Vec<Change>) -> Self {
            Self {
                id,
                changes,
                invalid: false,
                fail_on: None,
            }
        }
    }

    impl Entity<Log> for TestEntity {
        fn id(&self) -> String {
            self.id.to_string()
        }

        fn entity_type(&self) -> &'static str {
            "test"
        }

        fn description(&self) -> String {
            format!("Test entity {}", self.id)
        }

        fn validate(&self, _ctx: &Log) -> Result<()> {
            if self.invalid {
                return Err(Error::validation(self.id, "'path' is required for disk"));
            }
            Ok(())
        }

        fn plan(&self, _ctx: &Log) -> Result<Vec<Change>> {
            Ok(self.changes.clone())
        }

        fn apply(&self, change: &Change, ctx: &Log) -> Result<()> {
            let mut applied = ctx.applied.borrow_mut();
            if self.fail_on == Some(applied.len()) {
                return Err(Error::CommandFailed {
                    command: "lxc".into(),
                    status: Some(1),
                    stderr: "boom".into(),
                });
            }
            applied.push(format!("{}: {}", self.id, change));
            Ok(())
        }
    }

    fn plan_of(entities: Vec<TestEntity>) -> ConvergencePlan<Log> {
        let mut plan = ConvergencePlan::new();
        for e in entities {
            plan.push(Box::new(e));
        }
        plan
    }

    #[test]
    fn test_execute_empty_plan() {
        let log = Log::default();
        let summary = execute_simple(&ConvergencePlan::new(), &log, &ExecuteOptions::default())
            .unwrap();
        assert_eq!(summary.total(), 0);
    }

    #[test]
    fn test_execute_applies_in_order() {
        let log = Log::default();
        let plan = plan_of(vec![
            TestEntity::new("a", vec![Change::Create { initial: vec![] }]),
            TestEntity::new("b", vec![]),
            TestEntity::new("c", vec![Change::set("x", "1"), Change::unset("y")]),
        ]);

        let summary = execute_simple(&plan, &log, &ExecuteOptions::default()).unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(summary.no_change, 1);
        assert_eq!(summary.modified, 1);
        assert_eq!(summary.changes, 3);
        assert_eq!(*log.applied.borrow(), ["a: create", "c: set x=1", "c: unset y"]);
    }

    #[test]
    fn test_dry_run_applies_nothing() {
        let log = Log::default();
        let plan = plan_of(vec![TestEntity::new("a", vec![Change::Delete])]);
        let opts = ExecuteOptions {
            dry_run: true,
            ..Default::default()
        };

        let summary = execute_simple(&plan, &log, &opts).unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.changes, 1);
        assert!(log.applied.borrow().is_empty());
    }

    #[test]
    fn test_validation_failure_stops_before_any_change() {
        let log = Log::default();
        let mut bad = TestEntity::new("disk", vec![Change::set("path", "/srv")]);
        bad.invalid = true;
        let plan = plan_of(vec![bad, TestEntity::new("z", vec![Change::Delete])]);

        let err = execute_simple(&plan, &log, &ExecuteOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(log.applied.borrow().is_empty());
    }

    #[test]
    fn test_failure_keeps_applied_changes_and_aborts_run() {
        let log = Log::default();
        let mut flaky = TestEntity::new(
            "a",
            vec![Change::set("x", "1"), Change::set("y", "2"), Change::set("z", "3")],
        );
        flaky.fail_on = Some(1);
        let plan = plan_of(vec![flaky, TestEntity::new("b", vec![Change::Delete])]);

        let err = execute_simple(&plan, &log, &ExecuteOptions::default()).unwrap_err();
        assert!(err.is_command_failure());
        assert_eq!(*log.applied.borrow(), ["a: set x=1"]);
    }
}
