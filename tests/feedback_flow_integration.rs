//! Feedback Flow Integration Tests
//!
//! End-to-end flow over both stores without HTTP:
//! 1. Two viewers follow the same class
//! 2. Students submit reactions
//! 3. Both viewers converge on the same tally
//! 4. A tutor resets; both viewers drop to zero

mod common;

use classpulse_core::{
    reset_feedback, submit_feedback, ClassContext, ClassId, DocumentStore, ElevatedAccess,
    FeedbackAggregator, FeedbackPanel, InMemoryStore, LiveState, Reaction, UserIdentity,
};
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

async fn wait_for_total(rx: &mut watch::Receiver<LiveState>, total: u64) -> LiveState {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            {
                let state = rx.borrow_and_update();
                if state.is_live() && state.counts().map(|c| c.total()) == Some(total) {
                    return state.clone();
                }
            }
            rx.changed().await.expect("aggregator dropped");
        }
    })
    .await
    .expect("tally not reached in time")
}

async fn run_flow(store: Arc<dyn DocumentStore>) {
    let directory = test_directory();
    let class = ClassId::new("cp2106");

    let mut viewer_a = FeedbackAggregator::new(store.clone());
    let mut viewer_b = FeedbackAggregator::new(store.clone());
    let mut rx_a = viewer_a.watch();
    let mut rx_b = viewer_b.watch();
    viewer_a.start(class.clone()).await.unwrap();
    viewer_b.start(class.clone()).await.unwrap();
    assert_eq!(store.subscriber_count(&class), 2);

    wait_for_total(&mut rx_a, 0).await;

    let alice = directory
        .context_for(&class, UserIdentity::new(ALICE))
        .unwrap();
    let bob = directory.context_for(&class, UserIdentity::new(BOB)).unwrap();

    let mut writes = Vec::new();
    for (ctx, reaction) in [
        (alice.clone(), Reaction::Fast),
        (bob.clone(), Reaction::Fast),
        (alice.clone(), Reaction::Confusing),
        (bob.clone(), Reaction::Good),
    ] {
        let store = store.clone();
        writes.push(tokio::spawn(async move {
            submit_feedback(store.as_ref(), &ctx, reaction).await
        }));
    }
    for write in writes {
        write.await.unwrap().unwrap();
    }

    let a = wait_for_total(&mut rx_a, 4).await;
    let b = wait_for_total(&mut rx_b, 4).await;
    assert_eq!(a.counts(), b.counts());
    let counts = a.counts().unwrap();
    assert_eq!(counts.counts, [2, 0, 1, 1]);
    assert_eq!(counts.percentages(), [50, 0, 25, 25]);

    // Students see no reset control; the tutor does
    let student_panel = FeedbackPanel::build(class.clone(), &a, bob.has_elevated_access());
    assert!(!student_panel.reset_available);

    let tutor: ClassContext = directory
        .context_for(&class, UserIdentity::new(TUTOR.to_uppercase()))
        .unwrap();
    assert!(tutor.has_elevated_access());

    let denied = reset_feedback(store.clone(), &alice).await;
    assert!(denied.is_err());

    let report = reset_feedback(store.clone(), &tutor).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.deleted, 4);

    wait_for_total(&mut rx_a, 0).await;
    wait_for_total(&mut rx_b, 0).await;

    viewer_a.stop().await;
    assert_eq!(store.subscriber_count(&class), 1);
    drop(viewer_b);
    tokio::time::timeout(Duration::from_secs(2), async {
        while store.subscriber_count(&class) != 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("dropped aggregator kept its live query");
}

#[tokio::test]
async fn test_flow_in_memory() {
    run_flow(Arc::new(InMemoryStore::new())).await;
}

#[tokio::test]
async fn test_flow_libsql() {
    let (store, _dir) = create_test_store().await;
    run_flow(Arc::new(store)).await;
}

#[tokio::test]
async fn test_classes_are_isolated() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
    let directory = test_directory();
    let closed = ClassId::new("cp2106");
    let open = ClassId::new("open101");

    let mut viewer = FeedbackAggregator::new(store.clone());
    let mut rx = viewer.watch();
    viewer.start(closed.clone()).await.unwrap();
    wait_for_total(&mut rx, 0).await;

    let stranger = directory
        .context_for(&open, UserIdentity::new(OUTSIDER))
        .unwrap();
    submit_feedback(store.as_ref(), &stranger, Reaction::Slow)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(viewer.current().counts().map(|c| c.total()), Some(0));

    viewer.switch_class(open.clone()).await.unwrap();
    let state = wait_for_total(&mut rx, 1).await;
    assert_eq!(state.counts().unwrap().count(Reaction::Slow), 1);
    assert_eq!(store.subscriber_count(&closed), 0);
}
