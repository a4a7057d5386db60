use speak_core::model::{AuthToken, DrugId, Gender, Recording, Score, ScoreMap, Session, User, UserId};
use speak_core::time::fixed_now;
use storage::repository::{KeyValueStore, Storage};
use storage::sqlite::SqliteKvStore;
use storage::StorageKey;

fn drugs(names: &[&str]) -> Vec<DrugId> {
    names.iter().map(|n| DrugId::new(*n)).collect()
}

#[tokio::test]
async fn sqlite_store_overwrites_and_removes_values() {
    let repo = SqliteKvStore::open("sqlite:file:memdb_kv?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    // Migrations are idempotent.
    repo.migrate().await.expect("migrate twice");

    let key = StorageKey::LearningList(UserId::new(1));
    assert_eq!(repo.get(&key).await.unwrap(), None);

    repo.set(&key, r#"["a"]"#.into()).await.unwrap();
    repo.set(&key, r#"["a","b"]"#.into()).await.unwrap();
    assert_eq!(repo.get(&key).await.unwrap().as_deref(), Some(r#"["a","b"]"#));

    repo.remove(&key).await.unwrap();
    assert_eq!(repo.get(&key).await.unwrap(), None);
    // Removing a missing key is fine.
    repo.remove(&key).await.unwrap();
}

#[tokio::test]
async fn sqlite_storage_keeps_users_apart() {
    let storage = Storage::sqlite("sqlite:file:memdb_users?mode=memory&cache=shared")
        .await
        .expect("open storage");
    let alice = UserId::new(1);
    let bob = UserId::new(2);

    storage
        .progress
        .save_lists(alice, &drugs(&["Warfarin"]), &drugs(&["Digoxin"]))
        .await
        .unwrap();
    let mut scores = ScoreMap::new();
    scores.insert(DrugId::new("Digoxin"), Score::new(88));
    storage.progress.save_scores(alice, &scores).await.unwrap();

    storage
        .progress
        .save_lists(bob, &drugs(&["Heparin"]), &[])
        .await
        .unwrap();

    let a = storage.progress.load_progress(alice).await.unwrap();
    assert_eq!(a.learning, drugs(&["Warfarin"]));
    assert_eq!(a.finished, drugs(&["Digoxin"]));
    assert_eq!(a.scores, scores);

    let b = storage.progress.load_progress(bob).await.unwrap();
    assert_eq!(b.learning, drugs(&["Heparin"]));
    assert!(b.finished.is_empty());
    assert!(b.scores.is_empty());
}

#[tokio::test]
async fn sqlite_storage_persists_recordings_and_session() {
    let storage = Storage::sqlite("sqlite:file:memdb_recordings?mode=memory&cache=shared")
        .await
        .expect("open storage");
    let user = UserId::new(3);
    let drug = DrugId::new("Atorvastatin");

    let mut first = Recording::new("file:///one.m4a", fixed_now());
    first.score = Some(Score::new(71));
    let second = Recording::new("file:///two.m4a", fixed_now());
    storage
        .recordings
        .save_recordings(user, &drug, &[first.clone(), second.clone()])
        .await
        .unwrap();
    assert_eq!(
        storage.recordings.load_recordings(user, &drug).await.unwrap(),
        vec![first, second]
    );
    assert!(
        storage
            .recordings
            .load_recordings(UserId::new(4), &drug)
            .await
            .unwrap()
            .is_empty()
    );

    let session = Session::new(
        User {
            id: user,
            username: "rae".into(),
            email: "rae@example.com".into(),
            gender: Gender::Female,
        },
        AuthToken::new("token-3"),
    );
    storage.sessions.save_session(&session).await.unwrap();
    assert_eq!(storage.sessions.load_session().await.unwrap(), Some(session));
    storage.sessions.clear_session().await.unwrap();
    assert_eq!(storage.sessions.load_session().await.unwrap(), None);
}
