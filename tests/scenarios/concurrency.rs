//! Test: one catalog shared by concurrent invocations

use crate::helpers::*;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_invoker_across_tasks() {
    let invoker = Arc::new(demo_invoker(&["demos::etl", "demos::webhooks"]));

    let mut handles = Vec::new();
    for i in 0..16 {
        let invoker = Arc::clone(&invoker);
        handles.push(tokio::spawn(async move {
            let content = format!("  Page {}  ", i);
            let upstream = HashMap::from([("fetch".to_string(), json!({ "content": content }))]);
            invoker.invoke("clean", &json!({}), &upstream).await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let outcome = handle.await.unwrap().unwrap();
        let expected = format!("page {}", i);
        assert_eq!(outcome.value["content"], json!(expected));
        assert_eq!(outcome.value["length"], json!(expected.chars().count()));
    }
}

#[tokio::test]
async fn test_failures_do_not_affect_other_invocations() {
    let invoker = Arc::new(demo_invoker(&["demos::etl"]));

    let bad = {
        let invoker = Arc::clone(&invoker);
        tokio::spawn(async move { invoker.invoke_json("clean", "{}", "{}").await })
    };
    let good = {
        let invoker = Arc::clone(&invoker);
        tokio::spawn(async move {
            invoker
                .invoke_json("clean", "{}", r#"{"fetch": {"content": " Ok "}}"#)
                .await
        })
    };

    let err = bad.await.unwrap().unwrap_err();
    assert_kind(&err, "missing_upstream_result");
    assert_eq!(good.await.unwrap().unwrap().value["content"], json!("ok"));
}
