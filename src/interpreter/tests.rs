use super::*;
use crate::queries;
use crate::store::{KeyValueMedium, MemoryMedium};
use serde_json::json;

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

fn seeded() -> Interpreter {
    let store = Arc::new(LocalStore::in_memory());
    store
        .import(&json!({
            "profiles": [
                {"id": "u1", "username": "bob", "display_name": "Bob", "photo_url": null},
                {"id": "u2", "username": "alice", "display_name": "Alice", "photo_url": "a.png"},
                {"id": "u3", "username": "bobby", "display_name": "Bobby", "photo_url": null}
            ],
            "posts": [
                {"id": "p1", "user_id": "u1", "domain": "science", "content": "first", "created_at": "2024-01-01T00:00:00.000Z"},
                {"id": "p2", "user_id": "u2", "domain": "art", "content": "second", "created_at": "2024-01-02T00:00:00.000Z"},
                {"id": "p3", "user_id": "u1", "domain": "science", "content": "third", "created_at": "2024-01-03T00:00:00.000Z"},
                {"id": "p4", "user_id": "ghost", "domain": "science", "content": "orphan", "created_at": "2024-01-04T00:00:00.000Z"}
            ],
            "likes": [
                {"id": "l1", "post_id": "p1", "user_id": "u2"},
                {"id": "l2", "post_id": "p1", "user_id": "u3"},
                {"id": "l3", "post_id": "p3", "user_id": "u2"}
            ],
            "comments": [
                {"id": "c2", "post_id": "p1", "user_id": "u2", "content": "later", "created_at": "2024-01-05T00:00:00.000Z"},
                {"id": "c1", "post_id": "p1", "user_id": "u3", "content": "earlier", "created_at": "2024-01-04T00:00:00.000Z"}
            ],
            "follows": [
                {"follower_id": "u2", "following_id": "u1", "created_at": "2024-01-01T00:00:00.000Z"},
                {"follower_id": "u3", "following_id": "u1", "created_at": "2024-01-02T00:00:00.000Z"}
            ]
        }))
        .unwrap();
    Interpreter::new(store)
}

#[test]
fn test_profile_lookup_by_id() {
    let interpreter = Interpreter::new(Arc::new(LocalStore::in_memory()));
    interpreter
        .store()
        .set_table("profiles", &[row(json!({"id": "u1", "username": "bob"}))])
        .unwrap();

    let rows = interpreter.run("SELECT * FROM profiles WHERE id = ?", &[json!("u1")]);
    assert_eq!(rows, vec![row(json!({"id": "u1", "username": "bob"}))]);
}

#[test]
fn test_like_then_unlike_leaves_no_rows() {
    let interpreter = Interpreter::new(Arc::new(LocalStore::in_memory()));
    let inserted = interpreter.run(
        "INSERT INTO likes (id, post_id, user_id, created_at) VALUES (?, ?, ?, ?)",
        &[json!("l9"), json!("p1"), json!("u1"), json!("2024-01-01T00:00:00.000Z")],
    );
    assert!(inserted.is_empty());
    assert_eq!(interpreter.store().get_table("likes").len(), 1);

    interpreter.run(
        "DELETE FROM likes WHERE post_id = ? AND user_id = ?",
        &[json!("p1"), json!("u1")],
    );
    assert!(interpreter.store().get_table("likes").is_empty());
}

#[test]
fn test_unrecognized_query_returns_no_rows() {
    let interpreter = seeded();
    let execution = interpreter.run_classified("SELECT name FROM widgets GROUP BY name", &[]);
    assert_eq!(execution.shape, ShapeKind::Unrecognized);
    assert!(execution.rows.is_empty());

    assert!(interpreter.run("MERGE INTO posts USING x", &[json!(1)]).is_empty());
    assert!(interpreter.run("", &[]).is_empty());
}

#[test]
fn test_non_ascii_query_text_is_unrecognized() {
    let interpreter = seeded();
    for sql in ["WITH é AS (SELECT 1) SELECT 1", "selecé", "ÉLÉMENT", "inseré into posts", "€"] {
        let execution = interpreter.run_classified(sql, &[]);
        assert_eq!(execution.shape, ShapeKind::Unrecognized, "{}", sql);
        assert!(execution.rows.is_empty());
    }

    // Non-ASCII literals inside a recognized shape still work
    interpreter.run(
        queries::INSERT_POST,
        &[json!("p9"), json!("u1"), json!("art"), json!("café"), Value::Null, json!("2024-02-01T00:00:00.000Z")],
    );
    let rows = interpreter.run("SELECT id FROM posts WHERE content = 'café'", &[]);
    assert_eq!(rows, vec![row(json!({"id": "p9"}))]);
}

#[test]
fn test_recognized_empty_result_is_distinguishable() {
    let interpreter = seeded();
    let execution = interpreter.run_classified(queries::PROFILE_BY_ID, &[json!("nobody")]);
    assert_eq!(execution.shape, ShapeKind::Lookup);
    assert!(execution.rows.is_empty());
}

#[test]
fn test_insert_ignore_keeps_table_unchanged() {
    let interpreter = seeded();
    let before = interpreter.store().get_table("likes");

    interpreter.run(
        queries::INSERT_LIKE,
        &[json!("l1"), json!("p9"), json!("u9"), json!("2024-02-01T00:00:00.000Z")],
    );
    interpreter.run(
        queries::INSERT_LIKE,
        &[json!("l7"), json!("p1"), json!("u2"), json!("2024-02-01T00:00:00.000Z")],
    );
    assert_eq!(interpreter.store().get_table("likes"), before);

    interpreter.run(queries::FOLLOW, &[json!("u2"), json!("u1")]);
    assert_eq!(interpreter.store().get_table("follows").len(), 2);
    interpreter.run(queries::FOLLOW, &[json!("u1"), json!("u2")]);
    assert_eq!(interpreter.store().get_table("follows").len(), 3);
}

#[test]
fn test_feed_joins_profiles_and_aggregates() {
    let interpreter = seeded();
    let rows = interpreter.run(queries::FEED, &[json!("u2"), json!(10), json!(0)]);

    // Inner join drops the orphan post; newest first
    let ids: Vec<&Value> = rows.iter().map(|r| &r["id"]).collect();
    assert_eq!(ids, vec![&json!("p3"), &json!("p2"), &json!("p1")]);

    let p1 = &rows[2];
    assert_eq!(p1["username"], json!("bob"));
    assert_eq!(p1["like_count"], json!(2));
    assert_eq!(p1["comment_count"], json!(2));
    assert_eq!(p1["is_liked"], json!(1));
    assert_eq!(rows[1]["is_liked"], json!(0));
    assert_eq!(rows[1]["photo_url"], json!("a.png"));
}

#[test]
fn test_feed_by_domain_with_paging() {
    let interpreter = seeded();
    let rows = interpreter.run(
        queries::FEED_BY_DOMAIN,
        &[json!("u1"), json!("science"), json!(1), json!(1)],
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], json!("p1"));
    assert_eq!(rows[0]["is_liked"], json!(0));
}

#[test]
fn test_comments_are_oldest_first() {
    let interpreter = seeded();
    let rows = interpreter.run(queries::COMMENTS_FOR_POST, &[json!("p1")]);
    let contents: Vec<&Value> = rows.iter().map(|r| &r["content"]).collect();
    assert_eq!(contents, vec![&json!("earlier"), &json!("later")]);
    assert_eq!(rows[0]["username"], json!("bobby"));
}

#[test]
fn test_follow_graph_both_directions() {
    let interpreter = seeded();
    let followers = interpreter.run(queries::FOLLOWERS, &[json!("u1")]);
    let names: Vec<&Value> = followers.iter().map(|r| &r["username"]).collect();
    assert_eq!(names, vec![&json!("bobby"), &json!("alice")]);

    let following = interpreter.run(queries::FOLLOWING, &[json!("u2")]);
    assert_eq!(following.len(), 1);
    assert_eq!(following[0]["id"], json!("u1"));

    let check = interpreter.run(queries::IS_FOLLOWING, &[json!("u2"), json!("u1")]);
    assert_eq!(check, vec![row(json!({"is_following": 1}))]);
    assert!(interpreter.run(queries::IS_FOLLOWING, &[json!("u1"), json!("u2")]).is_empty());
}

#[test]
fn test_count_and_search() {
    let interpreter = seeded();
    assert_eq!(
        interpreter.run(queries::COUNT_LIKES, &[json!("p1")]),
        vec![row(json!({"count": 2}))]
    );

    let found = interpreter.run(queries::SEARCH_PROFILES, &[json!("%BOB%")]);
    let names: Vec<&Value> = found.iter().map(|r| &r["username"]).collect();
    assert_eq!(names, vec![&json!("bob"), &json!("bobby")]);
    assert!(!found[0].contains_key("bio"));
}

#[test]
fn test_upsert_profile_merges_existing_row() {
    let interpreter = seeded();
    interpreter.run(
        queries::UPSERT_PROFILE,
        &[json!("u1"), json!("ignored"), json!("Robert"), json!("r.png")],
    );
    let profiles = interpreter.store().get_table("profiles");
    assert_eq!(profiles.len(), 3);
    assert_eq!(profiles[0]["username"], json!("bob"));
    assert_eq!(profiles[0]["display_name"], json!("Robert"));
    assert_eq!(profiles[0]["photo_url"], json!("r.png"));

    interpreter.run(
        queries::UPSERT_PROFILE,
        &[json!("u4"), json!("carol"), json!("Carol"), Value::Null],
    );
    let profiles = interpreter.store().get_table("profiles");
    assert_eq!(profiles.len(), 4);
    assert!(profiles[3]["created_at"].as_str().unwrap().ends_with('Z'));
}

#[test]
fn test_update_targets_identity_row() {
    let interpreter = seeded();
    interpreter.run(
        queries::UPDATE_PROFILE,
        &[json!("Alicia"), json!("hi"), json!("b.png"), json!("u2")],
    );
    let rows = interpreter.run(queries::PROFILE_BY_ID, &[json!("u2")]);
    assert_eq!(rows[0]["display_name"], json!("Alicia"));
    assert_eq!(rows[0]["bio"], json!("hi"));

    let untouched = interpreter.run(queries::PROFILE_BY_ID, &[json!("u1")]);
    assert_eq!(untouched[0]["display_name"], json!("Bob"));

    interpreter.run("UPDATE posts SET views = views + 1 WHERE id = ?", &[json!("p2")]);
    interpreter.run("UPDATE posts SET views = views + 1 WHERE id = ?", &[json!("p2")]);
    assert_eq!(interpreter.run(queries::POST_BY_ID, &[json!("p2")])[0]["views"], json!(2));
}

#[test]
fn test_delete_post_cascade() {
    let interpreter = seeded();
    interpreter.run(queries::DELETE_POST_LIKES, &[json!("p1")]);
    interpreter.run(queries::DELETE_POST_COMMENTS, &[json!("p1")]);
    interpreter.run(queries::DELETE_POST, &[json!("p1")]);

    assert!(interpreter.run(queries::POST_BY_ID, &[json!("p1")]).is_empty());
    assert_eq!(interpreter.store().get_table("likes").len(), 1);
    assert!(interpreter.store().get_table("comments").is_empty());
}

#[test]
fn test_delete_by_parameter_count() {
    let interpreter = seeded();
    // Not a plain predicate list: falls back to matching the lone parameter
    // against every identity column
    let execution =
        interpreter.run_classified("DELETE FROM likes WHERE post_id IN (?)", &[json!("p3")]);
    assert_eq!(execution.shape, ShapeKind::Delete);
    let remaining: Vec<Value> = interpreter
        .store()
        .get_table("likes")
        .into_iter()
        .map(|r| r["id"].clone())
        .collect();
    assert_eq!(remaining, vec![json!("l1"), json!("l2")]);

    // Two parameters on a table without a natural key is not a known call
    let execution = interpreter
        .run_classified("DELETE FROM posts WHERE id IN (?, ?)", &[json!("p1"), json!("p2")]);
    assert_eq!(execution.shape, ShapeKind::Unrecognized);
    assert_eq!(interpreter.store().get_table("posts").len(), 4);
}

#[test]
fn test_corrupted_table_yields_no_rows() {
    let interpreter = seeded();
    let key = format!("{}posts", interpreter.store().prefix());
    let medium = MemoryMedium::new();
    medium.set(&key, "[{broken").unwrap();
    let store = Arc::new(LocalStore::new(Arc::new(medium), interpreter.store().prefix()));

    let broken = Interpreter::new(store);
    assert!(broken.run(queries::POST_BY_ID, &[json!("p1")]).is_empty());
}

#[test]
fn test_insert_keeps_unreadable_table_intact() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalStore::new(
        Arc::new(crate::store::FileMedium::open(dir.path()).unwrap()),
        crate::store::DEFAULT_KEY_PREFIX,
    ));
    store
        .set_table("posts", &[row(json!({"id": "p1"})), row(json!({"id": "p2"}))])
        .unwrap();

    let path = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .find(|path| path.is_file())
        .unwrap();
    let mut bytes = std::fs::read(&path).unwrap();
    bytes.push(0xFF);
    std::fs::write(&path, &bytes).unwrap();

    let interpreter = Interpreter::new(store);
    let execution = interpreter.run_classified("INSERT INTO posts (id) VALUES (?)", &[json!("p3")]);
    assert_eq!(execution.shape, ShapeKind::Insert);
    assert!(execution.rows.is_empty());
    assert_eq!(std::fs::read(&path).unwrap(), bytes);
}

#[test]
fn test_every_catalogue_query_is_recognized() {
    let interpreter = seeded();
    for (name, sql) in queries::ALL {
        let params: Vec<Value> = (0..sql.matches('?').count()).map(|i| json!(i)).collect();
        assert!(
            interpreter.classify(sql, &params).is_recognized(),
            "{} was not recognized",
            name
        );
    }
}
