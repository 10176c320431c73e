use std::time::Duration;

use tokio::sync::mpsc;

use super::*;
use crate::db::memory::MemoryStore;
use crate::db::models::challenge::{ChallengeId, ChallengeParticipation};
use crate::db::models::user::User;
use crate::db::store::ProfileStore;

#[derive(Debug)]
struct ChannelSink {
    tx: mpsc::UnboundedSender<View>,
}

#[async_trait]
impl ViewSink for ChannelSink {
    async fn publish(&self, view: &View) -> RealtimeResult<()> {
        // receiver dropped once a test has seen enough
        _ = self.tx.send(view.clone());
        Ok(())
    }
}

fn refresher(store: Arc<MemoryStore>) -> (Arc<RealtimeRefresher>, mpsc::UnboundedReceiver<View>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let refresher = RealtimeRefresher::new(store, Arc::new(ChannelSink { tx }));
    (Arc::new(refresher), rx)
}

async fn next_view(rx: &mut mpsc::UnboundedReceiver<View>) -> View {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("no view published")
        .expect("sink closed")
}

#[test]
fn test_view_mapping() {
    assert_eq!(views_for(Table::Users), &[ViewKind::Leaderboard]);
    assert_eq!(views_for(Table::ChallengeParticipants), &[ViewKind::Challenges]);
    assert!(views_for(Table::Classifications).is_empty());
}

#[tokio::test]
async fn test_prime_publishes_every_view() {
    let store = Arc::new(MemoryStore::seeded());
    let (refresher, mut rx) = refresher(store);

    refresher.prime().await;

    let kinds: Vec<_> = [
        next_view(&mut rx).await,
        next_view(&mut rx).await,
        next_view(&mut rx).await,
    ]
    .iter()
    .map(View::kind)
    .collect();

    assert_eq!(
        kinds,
        [ViewKind::Leaderboard, ViewKind::Challenges, ViewKind::Feed]
    );
}

#[tokio::test]
async fn test_user_change_refreshes_leaderboard() {
    let store = Arc::new(MemoryStore::seeded());
    let (refresher, mut rx) = refresher(store.clone());
    let handles = refresher.spawn();

    let mut user = User::new("u1".into());
    user.points = 40;
    store.insert_user(&user).await.unwrap();

    match next_view(&mut rx).await {
        View::Leaderboard(entries) => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].points, 40);
        }
        other => panic!("unexpected view: {other:?}"),
    }

    handles.iter().for_each(JoinHandle::abort);
}

#[tokio::test]
async fn test_participation_change_refreshes_standings() {
    let store = Arc::new(MemoryStore::seeded());
    let (refresher, mut rx) = refresher(store.clone());
    let handles = refresher.spawn();

    store
        .upsert_participation(&ChallengeParticipation {
            user_id: "u1".into(),
            challenge_id: ChallengeId(12),
            progress: 3.0,
            completed: false,
        })
        .await
        .unwrap();

    match next_view(&mut rx).await {
        View::Challenges(standings) => {
            let tree_day = standings
                .iter()
                .find(|s| s.challenge.id.0 == 12)
                .unwrap();
            assert_eq!(tree_day.participants, 1);
            assert_eq!(tree_day.community_progress, 3.0);
        }
        other => panic!("unexpected view: {other:?}"),
    }

    handles.iter().for_each(JoinHandle::abort);
}

#[tokio::test]
async fn test_store_failure_keeps_task_alive() {
    use crate::db::memory::Fault;
    use crate::db::models::post::Post;

    let store = Arc::new(MemoryStore::seeded());
    let (refresher, mut rx) = refresher(store.clone());
    let handles = refresher.spawn();

    store.fail_next(Fault::Read, 1);
    store
        .insert_post(&Post::new("u1".into(), "one", Default::default()))
        .await
        .unwrap();
    store
        .insert_post(&Post::new("u1".into(), "two", Default::default()))
        .await
        .unwrap();

    // the first refresh fails, the second sees both posts
    match next_view(&mut rx).await {
        View::Feed(posts) => assert_eq!(posts.len(), 2),
        other => panic!("unexpected view: {other:?}"),
    }

    handles.iter().for_each(JoinHandle::abort);
}
