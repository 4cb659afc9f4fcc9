//! End-to-end tests over the SQLite engine.

use futures::FutureExt;
use reldoc::prelude::*;
use reldoc::sqlite::SqliteEngine;
use serde_json::json;

fn user_schema() -> Schema {
    Schema::builder()
        .add_field(FieldDef::new("email", FieldType::Text).unique())
        .add_field(FieldDef::new("age", FieldType::Integer).indexed())
        .add_field(FieldDef::new("status", FieldType::Text).default_value("active"))
        .timestamps(true)
        .build()
        .unwrap()
}

async fn store() -> DocumentStore<SqliteEngine> {
    DocumentStore::new(SqliteEngine::open_in_memory().unwrap())
}

async fn users() -> (DocumentStore<SqliteEngine>, Collection<SqliteEngine>) {
    let store = store().await;
    let users = store.collection("users", user_schema()).await.unwrap();
    (store, users)
}

#[tokio::test]
async fn insert_assigns_id_and_timestamps() {
    let (_store, users) = users().await;
    let doc = users
        .insert_one(json!({"email": "alice@example.com", "age": 30}))
        .await
        .unwrap();

    let id = doc["id"].as_str().unwrap();
    assert!(!id.is_empty());
    assert!(doc["createdAt"].as_i64().unwrap() > 0);
    assert_eq!(doc["createdAt"], doc["updatedAt"]);
    // Default applied because the document omitted the field.
    assert_eq!(doc["status"], "active");

    let fetched = users.find_one(&Filter::id(id)).await.unwrap().unwrap();
    assert_eq!(fetched, doc);
}

#[tokio::test]
async fn caller_supplied_ids_are_honored() {
    let (_store, users) = users().await;
    let doc = users
        .insert_one(json!({"id": "u1", "email": "a@example.com"}))
        .await
        .unwrap();
    assert_eq!(doc["id"], "u1");

    let err = users
        .insert_one(json!({"id": "u1", "email": "b@example.com"}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UniqueConstraint { index, .. } if index == "id"));
}

#[tokio::test]
async fn indexed_filters_select_the_right_documents() {
    let (_store, users) = users().await;
    for (email, age) in [("a@x.com", 17), ("b@x.com", 21), ("c@x.com", 48)] {
        users.insert_one(json!({"email": email, "age": age})).await.unwrap();
    }

    let adults = users
        .find(
            Some(&Filter::gte("age", 21)),
            &FindOptions::default().sort("age", SortDirection::Desc),
        )
        .await
        .unwrap();
    assert_eq!(adults.len(), 2);
    assert_eq!(adults[0]["email"], "c@x.com");
    assert_eq!(adults[1]["email"], "b@x.com");

    let page = users
        .find(None, &FindOptions::default().sort("age", SortDirection::Asc).limit(1).offset(1))
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0]["age"], 21);
}

#[tokio::test]
async fn parsed_filters_match_builder_filters() {
    let (_store, users) = users().await;
    users.insert_one(json!({"email": "a@x.com", "age": 30})).await.unwrap();
    users.insert_one(json!({"email": "b@x.com", "age": 15})).await.unwrap();

    let parsed = Expr::parse(&json!({"age": {"$gte": 18, "$lt": 65}})).unwrap();
    let found = users.find(Some(&parsed), &FindOptions::default()).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["email"], "a@x.com");
}

#[tokio::test]
async fn update_merges_objects_and_replaces_arrays() {
    let (_store, users) = users().await;
    let doc = users
        .insert_one(json!({
            "email": "a@x.com",
            "profile": {"age": 25, "city": "Berlin"},
            "tags": ["user", "beta"],
        }))
        .await
        .unwrap();
    let created_at = doc["createdAt"].as_i64().unwrap();

    let update = Update::new()
        .set("profile", json!({"age": 26}))
        .set("tags", json!(["admin"]));
    let result = users
        .update_one(&Filter::id(doc["id"].as_str().unwrap()), &update, &UpdateOptions::default())
        .await
        .unwrap();
    assert_eq!(result.matched, 1);
    assert_eq!(result.modified, 1);

    let fetched = users.find_one(&Filter::eq("email", "a@x.com")).await.unwrap().unwrap();
    assert_eq!(fetched["profile"], json!({"age": 26, "city": "Berlin"}));
    assert_eq!(fetched["tags"], json!(["admin"]));
    assert_eq!(fetched["createdAt"].as_i64().unwrap(), created_at);
    assert!(fetched["updatedAt"].as_i64().unwrap() >= created_at);
}

#[tokio::test]
async fn clear_removes_keys_while_omission_preserves_them() {
    let (_store, users) = users().await;
    users
        .insert_one(json!({"email": "a@x.com", "nickname": "Al", "profile": {"city": "Berlin"}}))
        .await
        .unwrap();

    let update = Update::new().clear("nickname");
    users
        .update_one(&Filter::eq("email", "a@x.com"), &update, &UpdateOptions::default())
        .await
        .unwrap();

    let fetched = users.find_one(&Filter::eq("email", "a@x.com")).await.unwrap().unwrap();
    assert!(fetched.get("nickname").is_none());
    assert_eq!(fetched["profile"]["city"], "Berlin");
}

#[tokio::test]
async fn forbidden_keys_are_rejected() {
    let (_store, users) = users().await;
    let err = users
        .insert_one(json!({"email": "a@x.com", "__proto__": {"polluted": true}}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));

    users.insert_one(json!({"email": "b@x.com"})).await.unwrap();
    let err = users
        .update_one(
            &Filter::eq("email", "b@x.com"),
            &Update::new().set("nested", json!({"constructor": 1})),
            &UpdateOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}

#[tokio::test]
async fn unordered_insert_many_reports_per_index_errors() {
    let (_store, users) = users().await;
    let outcome = users
        .insert_many(
            vec![
                json!({"email": "a@x.com", "age": 1}),
                json!({"email": "a@x.com", "age": 2}),
                json!({"email": "c@x.com", "age": 3}),
            ],
            &InsertManyOptions { ordered: false },
        )
        .await
        .unwrap();

    assert_eq!(outcome.inserted.len(), 2);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].index, 1);
    assert!(matches!(outcome.errors[0].error, Error::UniqueConstraint { .. }));
}

#[tokio::test]
async fn ordered_insert_many_stops_at_first_error() {
    let (_store, users) = users().await;
    let outcome = users
        .insert_many(
            vec![
                json!({"email": "a@x.com"}),
                json!({"email": "a@x.com"}),
                json!({"email": "c@x.com"}),
            ],
            &InsertManyOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.inserted.len(), 1);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].index, 1);
    // The third document was never attempted.
    assert!(users.find_one(&Filter::eq("email", "c@x.com")).await.unwrap().is_none());
}

#[tokio::test]
async fn upsert_seeds_from_filter_equalities() {
    let (_store, users) = users().await;
    let filter = Filter::eq("email", "new@x.com").and(Filter::eq("profile.city", "Berlin"));
    let result = users
        .update_one(
            &filter,
            &Update::new().set("age", 40),
            &UpdateOptions { upsert: true },
        )
        .await
        .unwrap();
    assert_eq!(result.matched, 0);
    let id = result.upserted_id.unwrap();

    let doc = users.find_one(&Filter::id(&id)).await.unwrap().unwrap();
    assert_eq!(doc["email"], "new@x.com");
    assert_eq!(doc["profile"]["city"], "Berlin");
    assert_eq!(doc["age"], 40);

    // A second upsert with the same filter updates rather than inserting.
    let result = users
        .update_one(
            &filter,
            &Update::new().set("age", 41),
            &UpdateOptions { upsert: true },
        )
        .await
        .unwrap();
    assert_eq!(result.matched, 1);
    assert!(result.upserted_id.is_none());
    assert_eq!(users.find(None, &FindOptions::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn find_one_and_update_returns_before_or_after() {
    let (_store, users) = users().await;
    users.insert_one(json!({"email": "a@x.com", "age": 30})).await.unwrap();

    let after = users
        .find_one_and_update(
            &Filter::eq("email", "a@x.com"),
            &Update::new().set("age", 31),
            &ModifyOptions::default(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after["age"], 31);

    let before = users
        .find_one_and_update(
            &Filter::eq("email", "a@x.com"),
            &Update::new().set("age", 32),
            &ModifyOptions { return_document: ReturnDocument::Before, upsert: false },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before["age"], 31);
}

#[tokio::test]
async fn find_one_and_replace_returns_before_or_after() {
    let (_store, users) = users().await;
    let doc = users
        .insert_one(json!({"email": "a@x.com", "age": 30, "nickname": "Al"}))
        .await
        .unwrap();
    let created_at = doc["createdAt"].as_i64().unwrap();

    let after = users
        .find_one_and_replace(
            &Filter::eq("email", "a@x.com"),
            json!({"email": "a@x.com", "age": 31}),
            &ModifyOptions::default(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after["age"], 31);
    assert_eq!(after["createdAt"].as_i64().unwrap(), created_at);
    // Replacement is wholesale, so keys absent from the new body are gone.
    assert!(after.get("nickname").is_none());

    let before = users
        .find_one_and_replace(
            &Filter::eq("email", "a@x.com"),
            json!({"email": "a@x.com", "age": 32}),
            &ModifyOptions { return_document: ReturnDocument::Before, upsert: false },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before["age"], 31);

    // With upsert, a miss inserts the replacement body seeded from the
    // filter and returns it (there is no before image).
    let upserted = users
        .find_one_and_replace(
            &Filter::eq("email", "b@x.com"),
            json!({"age": 1}),
            &ModifyOptions { return_document: ReturnDocument::After, upsert: true },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(upserted["email"], "b@x.com");
    assert_eq!(upserted["age"], 1);
}

#[tokio::test]
async fn replace_keeps_id_and_creation_time() {
    let (_store, users) = users().await;
    let doc = users
        .insert_one(json!({"email": "a@x.com", "age": 30, "nickname": "Al"}))
        .await
        .unwrap();
    let id = doc["id"].as_str().unwrap().to_string();
    let created_at = doc["createdAt"].as_i64().unwrap();

    let result = users
        .replace_one(
            &Filter::id(&id),
            json!({"email": "a@x.com", "age": 31}),
            &ReplaceOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(result.modified, 1);

    let fetched = users.find_one(&Filter::id(&id)).await.unwrap().unwrap();
    assert_eq!(fetched["id"], id.as_str());
    assert_eq!(fetched["createdAt"].as_i64().unwrap(), created_at);
    assert_eq!(fetched["age"], 31);
    // Replacement is wholesale: untouched keys are gone.
    assert!(fetched.get("nickname").is_none());
}

#[tokio::test]
async fn delete_operations_report_counts() {
    let (_store, users) = users().await;
    for (email, age) in [("a@x.com", 10), ("b@x.com", 20), ("c@x.com", 30)] {
        users.insert_one(json!({"email": email, "age": age})).await.unwrap();
    }

    let gone = users
        .find_one_and_delete(&Filter::eq("email", "a@x.com"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(gone["email"], "a@x.com");

    assert_eq!(users.delete_many(Some(&Filter::gte("age", 25))).await.unwrap(), 1);
    assert_eq!(users.delete_one(&Filter::eq("email", "ghost@x.com")).await.unwrap(), 0);
    assert_eq!(users.find(None, &FindOptions::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn validators_reject_on_every_write_path() {
    let store = store().await;
    let schema = Schema::builder()
        .add_field(FieldDef::new("age", FieldType::Integer))
        .validator(|doc: &serde_json::Value| doc["age"].as_i64().is_some_and(|age| age >= 0))
        .build()
        .unwrap();
    let people = store.collection("people", schema).await.unwrap();

    let err = people.insert_one(json!({"age": -1})).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));

    people.insert_one(json!({"id": "p1", "age": 5})).await.unwrap();
    let err = people
        .update_one(&Filter::id("p1"), &Update::new().set("age", -3), &UpdateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));

    // The failed update rolled back.
    let doc = people.find_one(&Filter::id("p1")).await.unwrap().unwrap();
    assert_eq!(doc["age"], 5);
}

#[tokio::test]
async fn required_fields_are_enforced_on_every_write() {
    let store = store().await;
    let schema = Schema::builder()
        .add_field(FieldDef::new("email", FieldType::Text).unique().required())
        .add_field(FieldDef::new("age", FieldType::Integer).indexed())
        .build()
        .unwrap();
    let people = store.collection("people", schema).await.unwrap();

    let err = people.insert_one(json!({"age": 3})).await.unwrap_err();
    assert!(matches!(err, Error::Constraint(_)));
    let err = people
        .insert_one(json!({"email": null, "age": 3}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Constraint(_)));

    people.insert_one(json!({"id": "p1", "email": "a@x.com"})).await.unwrap();
    let err = people
        .update_one(&Filter::id("p1"), &Update::new().clear("email"), &UpdateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Constraint(_)));

    // The rejected update left the stored document untouched.
    let doc = people.find_one(&Filter::id("p1")).await.unwrap().unwrap();
    assert_eq!(doc["email"], "a@x.com");

    // A schema default satisfies the requirement for documents omitting
    // the field.
    let schema = Schema::builder()
        .add_field(FieldDef::new("status", FieldType::Text).required().default_value("active"))
        .build()
        .unwrap();
    let tickets = store.collection("tickets", schema).await.unwrap();
    let doc = tickets.insert_one(json!({"title": "hello"})).await.unwrap();
    assert_eq!(doc["status"], "active");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_keep_savepoints_isolated() {
    let (_store, users) = users().await;
    users.insert_one(json!({"id": "u1", "email": "a@x.com", "age": 0})).await.unwrap();
    users.insert_one(json!({"id": "u2", "email": "b@x.com", "age": 0})).await.unwrap();

    // Two tasks hammer overlapping read-modify-write scopes on the shared
    // connection; every one must commit cleanly.
    let run = |id: &'static str, users: Collection<SqliteEngine>| async move {
        for i in 1..=20i64 {
            let result = users
                .update_one(&Filter::id(id), &Update::new().set("age", i), &UpdateOptions::default())
                .await
                .unwrap();
            assert_eq!(result.modified, 1);
        }
    };
    let first = tokio::spawn(run("u1", users.clone()));
    let second = tokio::spawn(run("u2", users.clone()));
    first.await.unwrap();
    second.await.unwrap();

    let docs = users.find(None, &FindOptions::default()).await.unwrap();
    assert_eq!(docs.len(), 2);
    assert!(docs.iter().all(|d| d["age"] == 20));
}

#[tokio::test]
async fn transaction_closure_rolls_back_on_error() {
    let (store, users) = users().await;

    let inserted = users.clone();
    let err = store
        .transaction(|_| {
            let users = inserted.clone();
            async move {
                users.insert_one(json!({"email": "tx@x.com"})).await?;
                Err::<(), _>(Error::validation("transfer", "insufficient funds"))
            }
            .boxed()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    assert!(users.find_one(&Filter::eq("email", "tx@x.com")).await.unwrap().is_none());

    let committed = users.clone();
    store
        .transaction(|_| {
            let users = committed.clone();
            async move {
                users.insert_one(json!({"email": "tx@x.com"})).await?;
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap();
    assert!(users.find_one(&Filter::eq("email", "tx@x.com")).await.unwrap().is_some());
}

#[tokio::test]
async fn dropped_transaction_handle_rolls_back() {
    let (store, users) = users().await;

    let tx = store.begin_transaction().unwrap();
    users.insert_one(json!({"email": "a@x.com"})).await.unwrap();
    drop(tx);

    assert!(users.find(None, &FindOptions::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn change_events_follow_successful_writes() {
    let (store, users) = users().await;
    let events = store.subscribe();

    let doc = users.insert_one(json!({"email": "a@x.com"})).await.unwrap();
    let id = doc["id"].as_str().unwrap().to_string();
    users
        .update_one(&Filter::id(&id), &Update::new().set("age", 1), &UpdateOptions::default())
        .await
        .unwrap();
    users.delete_one(&Filter::id(&id)).await.unwrap();

    let received: Vec<ChangeEvent> = events.try_iter().collect();
    assert_eq!(received.len(), 3);
    assert_eq!(received[0].kind, ChangeKind::Insert { id: id.clone() });
    assert_eq!(received[1].kind, ChangeKind::Update { id: id.clone(), upserted: false });
    assert_eq!(received[2].kind, ChangeKind::Delete { id });
    assert!(received.iter().all(|e| e.collection == "users"));

    // Failed writes emit nothing.
    let _ = users.delete_one(&Filter::id("ghost")).await.unwrap();
    assert!(events.try_iter().next().is_none());
}

#[tokio::test]
async fn drop_collection_discards_table_and_is_idempotent() {
    let (store, users) = users().await;
    users.insert_one(json!({"email": "a@x.com"})).await.unwrap();

    store.drop_collection("users").await.unwrap();
    store.drop_collection("users").await.unwrap();

    // Re-opening plans a fresh, empty collection.
    let users = store.collection("users", user_schema()).await.unwrap();
    assert!(users.find(None, &FindOptions::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn schema_evolution_extends_existing_collections() {
    let store = store().await;
    let v1 = Schema::builder()
        .add_field(FieldDef::new("email", FieldType::Text).unique())
        .build()
        .unwrap();
    let users = store.collection("users", v1).await.unwrap();
    users.insert_one(json!({"email": "a@x.com", "age": 30})).await.unwrap();

    let v2 = Schema::builder()
        .add_field(FieldDef::new("email", FieldType::Text).unique())
        .add_field(FieldDef::new("age", FieldType::Integer).indexed())
        .build()
        .unwrap();
    let users = store.collection("users", v2).await.unwrap();

    // The old row is visible through the new index column.
    let found = users.find(Some(&Filter::gte("age", 18)), &FindOptions::default()).await.unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn pre_cancelled_token_leaves_healthy_calls_alone() {
    let (_store, users) = users().await;
    let token = CancellationToken::new();
    token.cancel();

    let handle = users.with_options(
        CallOptions::with_retry(RetryOptions::enabled()).with_cancellation(token),
    );
    // The operation itself succeeds without needing a retry, so a
    // pre-cancelled token does not reject a healthy call.
    handle.insert_one(json!({"email": "a@x.com"})).await.unwrap();
}
