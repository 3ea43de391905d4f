mod common;

use common::{balance, engine, seeded_store};
use payledger::domain::ports::{LedgerStore, UnitOfWork};
use payledger::domain::transfer::{DuplicatePolicy, TransferRequest};
use payledger::error::TransferError;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_opposite_direction_transfers_conserve_funds() {
    let store = seeded_store(&[("A", 1000), ("B", 1000)]).await;
    let engine = engine(&store, DuplicatePolicy::ReturnPrior);

    let plan: Vec<(bool, i64)> = {
        let mut rng = rand::thread_rng();
        (0..400)
            .map(|_| (rng.gen_bool(0.5), rng.gen_range(1..=150)))
            .collect()
    };

    let mut tasks = tokio::task::JoinSet::new();
    for (i, (a_to_b, amount)) in plan.into_iter().enumerate() {
        let engine = Arc::clone(&engine);
        let (from, to) = if a_to_b { ("A", "B") } else { ("B", "A") };
        tasks.spawn(async move {
            engine
                .transfer(&TransferRequest::new(format!("c{i}"), from, to, amount), None)
                .await
        });
    }

    let drained = tokio::time::timeout(Duration::from_secs(30), async {
        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            outcomes.push(joined.unwrap());
        }
        outcomes
    })
    .await
    .expect("transfers deadlocked");

    for outcome in &drained {
        assert!(
            matches!(outcome, Ok(_) | Err(TransferError::InsufficientFunds { .. })),
            "unexpected outcome: {outcome:?}"
        );
    }

    let a = balance(&store, "A").await;
    let b = balance(&store, "B").await;
    assert_eq!(a + b, 2000);
    assert!(a >= 0 && b >= 0);
    assert_eq!(store.ledger_history(None).await.unwrap().len(), 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disjoint_pairs_do_not_block_each_other() {
    let store = seeded_store(&[("A", 100), ("B", 0), ("C", 100), ("D", 0)]).await;
    let engine = engine(&store, DuplicatePolicy::ReturnPrior);

    // Hold A's row lock; C -> D must still complete.
    let a = store.account_by_number("A").await.unwrap().unwrap();
    let mut holder = store.begin(Default::default()).await.unwrap();
    holder.lock_account(a.id).await.unwrap();

    let receipt = tokio::time::timeout(
        Duration::from_secs(1),
        engine.transfer(&TransferRequest::new("cd", "C", "D", 50), None),
    )
    .await
    .expect("disjoint transfer blocked");
    assert!(receipt.is_ok());

    drop(holder);
    assert_eq!(balance(&store, "D").await, 50);
}
