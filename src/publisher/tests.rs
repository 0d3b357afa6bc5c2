use super::*;
use crate::bus::MockBus;
use crate::test_utils::eventually;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn publisher_with(bus: &Arc<MockBus>) -> FilePublisher {
    FilePublisher::new(bus.clone(), &ProcessingLimits::for_test())
}

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

async fn wait_for_removal(path: &Path) -> bool {
    eventually(WAIT, move || async move { !path.exists() }).await
}

#[tokio::test]
async fn test_words_published_by_length_and_file_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(MockBus::new());
    let publisher = publisher_with(&bus);

    let path = write_file(dir.path(), "a.txt", "the quick\nbrown  fox");
    publisher.submit(path.clone());

    assert!(wait_for_removal(&path).await);
    publisher.shutdown().await;

    assert_eq!(
        bus.published().await,
        vec![
            ("3".to_string(), "the".to_string()),
            ("5".to_string(), "quick".to_string()),
            ("5".to_string(), "brown".to_string()),
            ("3".to_string(), "fox".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_long_word_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(MockBus::new());
    let publisher = publisher_with(&bus);

    let path = write_file(dir.path(), "long.txt", "hi internationalization ok");
    let outcome = publisher.publish_file(&path).await.unwrap();

    assert_eq!(outcome, FileOutcome::Published { words: 2 });
    assert!(!path.exists());
    let topics: Vec<_> = bus.published().await.into_iter().map(|(t, _)| t).collect();
    assert_eq!(topics, vec!["2", "2"]);
}

#[tokio::test]
async fn test_max_length_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(MockBus::new());
    let publisher = publisher_with(&bus);

    let path = write_file(dir.path(), "edge.txt", "abcdefghij abcdefghijk");
    publisher.publish_file(&path).await.unwrap();

    assert_eq!(
        bus.published().await,
        vec![("10".to_string(), "abcdefghij".to_string())]
    );
}

#[tokio::test]
async fn test_empty_file_deleted_without_messages() {
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(MockBus::new());
    let publisher = publisher_with(&bus);

    let path = write_file(dir.path(), "empty.txt", "");
    let outcome = publisher.publish_file(&path).await.unwrap();

    assert_eq!(outcome, FileOutcome::Published { words: 0 });
    assert!(!path.exists());
    assert_eq!(bus.published_count().await, 0);
}

#[tokio::test]
async fn test_vanished_file_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(MockBus::new());
    let publisher = publisher_with(&bus);

    let outcome = publisher
        .publish_file(&dir.path().join("gone.txt"))
        .await
        .unwrap();
    assert_eq!(outcome, FileOutcome::Skipped);

    let outcome = publisher.publish_file(dir.path()).await.unwrap();
    assert_eq!(outcome, FileOutcome::Skipped);
}

#[tokio::test]
async fn test_invalid_utf8_is_left_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(MockBus::new());
    let publisher = publisher_with(&bus);

    let path = dir.path().join("binary.dat");
    std::fs::write(&path, [0xff, 0xfe, 0x00, 0x80]).unwrap();

    let result = publisher.publish_file(&path).await;
    assert!(matches!(result, Err(FileError::Read { .. })));
    assert!(path.exists());
    assert_eq!(bus.published_count().await, 0);
}

#[tokio::test]
async fn test_publish_failure_leaves_file() {
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(MockBus::new());
    bus.set_fail_on_publish("5").await;
    let publisher = publisher_with(&bus);

    let path = write_file(dir.path(), "fail.txt", "cat hello dog");
    let result = publisher.publish_file(&path).await;

    assert!(matches!(result, Err(FileError::Publish { .. })));
    assert!(path.exists());
    // Words before the failure were already handed over.
    assert_eq!(
        bus.published().await,
        vec![("3".to_string(), "cat".to_string())]
    );
}

#[tokio::test]
async fn test_submit_after_shutdown_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(MockBus::new());
    let publisher = publisher_with(&bus);
    publisher.shutdown().await;

    let path = write_file(dir.path(), "late.txt", "too late");
    publisher.submit(path.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(path.exists());
    assert_eq!(bus.published_count().await, 0);
}

#[tokio::test]
async fn test_shutdown_twice_cleans_up_once() {
    let bus = Arc::new(MockBus::new());
    let publisher = publisher_with(&bus);

    publisher.shutdown().await;
    publisher.shutdown().await;

    assert_eq!(bus.flush_calls(), 1);
    assert_eq!(bus.close_calls(), 1);
    assert_eq!(publisher.state(), LifecycleState::Closed);
}

#[tokio::test]
async fn test_concurrent_shutdown_cleans_up_once() {
    let bus = Arc::new(MockBus::new());
    let publisher = Arc::new(publisher_with(&bus));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let publisher = Arc::clone(&publisher);
            tokio::spawn(async move {
                publisher.shutdown().await;
                publisher.state()
            })
        })
        .collect();

    for handle in handles {
        // Every caller returns only after cleanup finished.
        assert_eq!(handle.await.unwrap(), LifecycleState::Closed);
    }
    assert_eq!(bus.flush_calls(), 1);
    assert_eq!(bus.close_calls(), 1);
}

#[tokio::test]
async fn test_flush_failure_still_closes() {
    let bus = Arc::new(MockBus::new());
    bus.set_fail_on_flush(true).await;
    let publisher = publisher_with(&bus);

    publisher.shutdown().await;

    assert_eq!(bus.flush_calls(), 1);
    assert_eq!(bus.close_calls(), 1);
    assert_eq!(publisher.state(), LifecycleState::Closed);
}

#[tokio::test]
async fn test_shutdown_drains_submitted_files() {
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(MockBus::new());
    let publisher = publisher_with(&bus);

    let path = write_file(dir.path(), "one.txt", "alpha beta");
    publisher.file_created(path.clone());
    assert!(wait_for_removal(&path).await);

    publisher.shutdown().await;
    assert_eq!(bus.published_count().await, 2);
}

#[tokio::test]
async fn test_files_queued_at_shutdown_stay_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(MockBus::new());
    bus.set_publish_delay(Duration::from_millis(300)).await;
    let publisher = publisher_with(&bus);

    let first = write_file(dir.path(), "first.txt", "slow");
    let second = write_file(dir.path(), "second.txt", "queued");
    let third = write_file(dir.path(), "third.txt", "waiting");
    publisher.submit(first.clone());
    publisher.submit(second.clone());
    publisher.submit(third.clone());

    // Let the single worker pick up the first file.
    tokio::time::sleep(Duration::from_millis(50)).await;
    publisher.shutdown().await;

    assert!(!first.exists());
    assert!(second.exists());
    assert!(third.exists());
    assert_eq!(
        bus.published().await,
        vec![("4".to_string(), "slow".to_string())]
    );
    assert_eq!(publisher.state(), LifecycleState::Closed);
}
