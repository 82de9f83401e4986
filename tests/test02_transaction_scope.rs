use sql_scope::test_utils::RecordingDriver;
use sql_scope::{DbError, ExecutionContext, TransactionScope, with_transaction};

#[test]
fn nested_success_commits_once_at_outermost() -> Result<(), DbError> {
    let driver = RecordingDriver::new();
    let engine = driver.engine();
    let mut ctx = ExecutionContext::new(&engine);

    with_transaction(&mut ctx, |ctx| {
        ctx.execute("A", &[])?;
        with_transaction(ctx, |ctx| {
            ctx.execute("B", &[])?;
            with_transaction(ctx, |ctx| ctx.execute("C", &[]))
        })?;
        assert_eq!(driver.snapshot().commits, 0, "inner levels must not commit");
        Ok::<_, DbError>(())
    })?;

    let log = driver.snapshot();
    assert_eq!(log.commits, 1);
    assert_eq!(log.rollbacks, 0);
    assert_eq!((log.connects, log.closes), (1, 1));
    assert_eq!(ctx.transaction_depth(), 0);
    Ok(())
}

#[test]
fn inner_success_then_outer_failure_rolls_back_once() {
    let driver = RecordingDriver::new();
    driver.fail_statements_containing("C");
    let engine = driver.engine();
    let mut ctx = ExecutionContext::new(&engine);

    let result = with_transaction(&mut ctx, |ctx| {
        ctx.execute("A", &[])?;
        with_transaction(ctx, |ctx| ctx.execute("B", &[]))?;
        assert_eq!(driver.snapshot().commits, 0);
        ctx.execute("C", &[])
    });

    match result {
        Err(DbError::ExecutionError(msg)) => assert!(msg.contains('C')),
        other => panic!("expected C's error, got {other:?}"),
    }
    let log = driver.snapshot();
    assert_eq!(log.rollbacks, 1);
    assert_eq!(log.commits, 0);
    assert_eq!((log.connects, log.closes), (1, 1));
}

#[test]
fn inner_failure_propagated_rolls_back_once() {
    let driver = RecordingDriver::new();
    driver.fail_statements_containing("B");
    let engine = driver.engine();
    let mut ctx = ExecutionContext::new(&engine);

    let result = with_transaction(&mut ctx, |ctx| {
        ctx.execute("A", &[])?;
        with_transaction(ctx, |ctx| ctx.execute("B", &[]))?;
        ctx.execute("never reached", &[])
    });

    assert!(matches!(result, Err(DbError::ExecutionError(_))));
    let log = driver.snapshot();
    assert_eq!((log.commits, log.rollbacks), (0, 1));
    assert_eq!(log.statements, vec!["A", "B"]);
}

#[test]
fn swallowed_inner_failure_aborts_outer_commit() {
    let driver = RecordingDriver::new();
    driver.fail_statements_containing("B");
    let engine = driver.engine();
    let mut ctx = ExecutionContext::new(&engine);

    let result = with_transaction(&mut ctx, |ctx| {
        ctx.execute("A", &[])?;
        let inner = with_transaction(ctx, |ctx| ctx.execute("B", &[]));
        assert!(inner.is_err());
        ctx.execute("C", &[])?;
        Ok::<_, DbError>(())
    });

    assert!(matches!(result, Err(DbError::TransactionAborted(_))));
    let log = driver.snapshot();
    assert_eq!((log.commits, log.rollbacks), (0, 1));
    assert_eq!(ctx.transaction_depth(), 0);

    // The rollback-only mark does not leak into the next transaction.
    driver.fail_statements_containing("never");
    with_transaction(&mut ctx, |ctx| ctx.execute("D", &[]))
        .expect("fresh transaction commits");
    assert_eq!(driver.snapshot().commits, 1);
}

#[test]
fn sequential_outermost_transactions_use_separate_connections() -> Result<(), DbError> {
    let driver = RecordingDriver::new();
    let engine = driver.engine();
    let mut ctx = ExecutionContext::new(&engine);

    with_transaction(&mut ctx, |ctx| ctx.execute("first", &[]))?;
    with_transaction(&mut ctx, |ctx| ctx.execute("second", &[]))?;

    let log = driver.snapshot();
    assert_eq!(log.connects, 2);
    assert_eq!(log.commits, 2);
    assert_eq!(log.closes, 2);
    Ok(())
}

#[test]
fn statements_inside_transaction_do_not_auto_commit() -> Result<(), DbError> {
    let driver = RecordingDriver::new();
    let engine = driver.engine();
    let mut ctx = ExecutionContext::new(&engine);

    let mut tx = TransactionScope::begin(&mut ctx)?;
    tx.execute("A", &[])?;
    tx.execute("B", &[])?;
    assert_eq!(driver.snapshot().commits, 0);
    tx.commit()?;

    assert_eq!(driver.snapshot().commits, 1);
    Ok(())
}

#[test]
fn commit_failure_rolls_back_and_surfaces_commit_error() {
    let driver = RecordingDriver::new();
    driver.fail_commit(true);
    let engine = driver.engine();
    let mut ctx = ExecutionContext::new(&engine);

    let result = with_transaction(&mut ctx, |ctx| ctx.execute("A", &[]));

    match result {
        Err(DbError::ExecutionError(msg)) => assert_eq!(msg, "commit failed"),
        other => panic!("expected commit error, got {other:?}"),
    }
    let log = driver.snapshot();
    assert_eq!((log.commits, log.rollbacks, log.closes), (0, 1, 1));
}

#[test]
fn rollback_failure_keeps_original_error() {
    let driver = RecordingDriver::new();
    driver.fail_statements_containing("A");
    driver.fail_rollback(true);
    let engine = driver.engine();
    let mut ctx = ExecutionContext::new(&engine);

    let result = with_transaction(&mut ctx, |ctx| ctx.execute("A", &[]));

    match result {
        Err(DbError::ExecutionError(msg)) => assert!(msg.contains("statement failed")),
        other => panic!("expected statement error, got {other:?}"),
    }
    let log = driver.snapshot();
    assert_eq!((log.rollbacks, log.closes), (1, 1));
    assert!(!ctx.is_initialized());
}

#[test]
fn panic_inside_transaction_rolls_back() {
    let driver = RecordingDriver::new();
    let engine = driver.engine();
    let mut ctx = ExecutionContext::new(&engine);

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = with_transaction(&mut ctx, |ctx| {
            ctx.execute("A", &[])?;
            if ctx.transaction_depth() == 1 {
                panic!("boom");
            }
            Ok::<_, DbError>(())
        });
    }));

    assert!(outcome.is_err());
    let log = driver.snapshot();
    assert_eq!((log.commits, log.rollbacks, log.closes), (0, 1, 1));
    assert_eq!(ctx.transaction_depth(), 0);
}

#[test]
fn explicit_inner_rollback_marks_outer() -> Result<(), DbError> {
    let driver = RecordingDriver::new();
    let engine = driver.engine();
    let mut ctx = ExecutionContext::new(&engine);

    let mut outer = TransactionScope::begin(&mut ctx)?;
    outer.execute("A", &[])?;
    {
        let inner = TransactionScope::begin(&mut outer)?;
        inner.rollback()?;
    }
    assert_eq!(driver.snapshot().rollbacks, 0, "inner rollback is deferred");
    let err = outer.commit().unwrap_err();

    assert!(matches!(err, DbError::TransactionAborted(_)));
    assert_eq!(driver.snapshot().rollbacks, 1);
    Ok(())
}
