//! Integration tests for snapshot restore.

mod common;

use std::sync::Arc;

use common::*;
use curator_engine::{JobId, Record, ReferenceRow, RefCollection};
use curator_server::db::{content, StorageDriver, Tables};
use curator_server::error::AppError;
use curator_server::handlers::backup::{SnapshotRef, SnapshotScope};
use curator_server::handlers::restore::{init, step, StepReport};
use serde_json::json;

async fn seed_blog(env: &TestEnv) {
    let driver = env.driver();
    seed_record(driver, 1, "post", 0).await;
    seed_record(driver, 3, "page", 0).await;
    seed_record(driver, 4, "attachment", 1).await;
    seed_record(driver, 6, "post_draft", 1).await;
    seed_comment(driver, 10, 1, "alice").await;
    seed_comment(driver, 11, 3, "bob").await;
    seed_field(driver, 1, "thumb", "a.png").await;
    seed_field(driver, 4, "mime", "image/png").await;
    seed_relationship(driver, 1, 2).await;
    seed_relationship(driver, 6, 2).await;
}

async fn dump(driver: &dyn StorageDriver, tables: &Tables) -> (Vec<Record>, Vec<ReferenceRow>) {
    let mut tx = driver.begin().await.unwrap();
    let records = content::fetch_records(tx.as_mut(), tables, None).await.unwrap();
    let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
    let mut references = Vec::new();
    for collection in RefCollection::ALL {
        let mut rows = content::fetch_references(tx.as_mut(), tables, collection, &ids)
            .await
            .unwrap();
        rows.sort_by_key(|row| serde_json::to_string(&row.fields).unwrap());
        references.extend(rows);
    }
    tx.commit().await.unwrap();
    (records, references)
}

/// Drive a job to completion, returning every step report.
async fn run_to_end(
    driver: &dyn StorageDriver,
    env: &TestEnv,
    job_id: &JobId,
    batch_size: usize,
) -> Vec<StepReport> {
    let mut reports = Vec::new();
    for _ in 0..1000 {
        let report = step(driver, &env.tables, &env.backups, &env.jobs, job_id, batch_size)
            .await
            .unwrap();
        let done = report.progress.done;
        reports.push(report);
        if done {
            return reports;
        }
    }
    panic!("restore did not finish");
}

async fn write_snapshot_file(env: &TestEnv, name: &str, body: serde_json::Value) {
    let dir = env.backups.dir().to_path_buf();
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join(name), serde_json::to_vec_pretty(&body).unwrap())
        .await
        .unwrap();
}

#[cfg(test)]
mod restore_tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_into_empty_store() {
        let env = TestEnv::new().await;
        seed_blog(&env).await;
        let before = dump(env.driver(), &env.tables).await;

        env.backups
            .snapshot(env.driver(), &env.tables, SnapshotScope::All)
            .await
            .unwrap();
        clear_store(env.driver()).await;
        assert!(content_ids(env.driver()).await.is_empty());

        let started = init(&env.backups, &env.jobs, &SnapshotRef::Latest).await.unwrap();
        assert_eq!(started.totals.records, 4);
        assert_eq!(started.totals.refs, 6);
        assert_eq!(started.total, 10);

        let reports = run_to_end(env.driver(), &env, &started.job_id, 200).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].skipped, 0);
        assert_eq!(reports[0].progress.percent, 100);

        assert_eq!(dump(env.driver(), &env.tables).await, before);
    }

    #[tokio::test]
    async fn test_restore_is_idempotent() {
        let env = TestEnv::new().await;
        seed_blog(&env).await;
        let before = dump(env.driver(), &env.tables).await;

        env.backups
            .snapshot(env.driver(), &env.tables, SnapshotScope::All)
            .await
            .unwrap();

        // Restoring over the live data, twice, must not duplicate anything.
        for _ in 0..2 {
            let started = init(&env.backups, &env.jobs, &SnapshotRef::Latest).await.unwrap();
            run_to_end(env.driver(), &env, &started.job_id, 3).await;
        }

        assert_eq!(dump(env.driver(), &env.tables).await, before);
        let comments = column(
            env.driver(),
            "SELECT coid FROM typecho_comments ORDER BY coid",
            "coid",
        )
        .await;
        assert_eq!(comments, vec![10, 11]);
    }

    #[tokio::test]
    async fn test_batch_of_one_advances_monotonically() {
        let env = TestEnv::new().await;
        seed_blog(&env).await;
        env.backups
            .snapshot(env.driver(), &env.tables, SnapshotScope::All)
            .await
            .unwrap();
        clear_store(env.driver()).await;

        let started = init(&env.backups, &env.jobs, &SnapshotRef::Latest).await.unwrap();
        let job_path = env.jobs.path(&started.job_id);
        assert!(job_path.exists());

        let mut last_processed = 0;
        let mut last_percent = 0;
        let mut steps = 0;
        loop {
            let report = step(
                env.driver(),
                &env.tables,
                &env.backups,
                &env.jobs,
                &started.job_id,
                1,
            )
            .await
            .unwrap();
            steps += 1;

            assert_eq!(report.progress.processed, last_processed + 1);
            assert!(report.progress.percent >= last_percent);
            last_processed = report.progress.processed;
            last_percent = report.progress.percent;

            if report.progress.done {
                break;
            }
            assert!(job_path.exists());
        }

        assert_eq!(steps, 10);
        assert_eq!(last_percent, 100);
        assert!(!job_path.exists());
        assert_eq!(content_ids(env.driver()).await, vec![1, 3, 4, 6]);
    }

    #[tokio::test]
    async fn test_adds_missing_columns_and_tolerates_one_failure() {
        let env = TestEnv::new().await;
        write_snapshot_file(
            &env,
            "AMD_backup_20240101_01.json",
            json!({
                "version": "2.0",
                "timestamp": 1_704_067_200,
                "records": [
                    {
                        "cid": 1, "type": "post", "parent": 0, "title": "One",
                        "extra_meta": "hello", "broken_flag": true
                    },
                    {
                        "cid": 2, "type": "page", "parent": 0, "title": "Two",
                        "extra_meta": null, "broken_flag": false
                    }
                ],
                "referenceRows": [
                    {
                        "collection": "comments", "coid": 5, "cid": 1, "author": "carol",
                        "text": "hi", "parent": 0, "mood": 3
                    }
                ]
            }),
        )
        .await;

        let failing = FailingDriver::new(Arc::clone(&env.driver)).fail_add_column("broken_flag");
        let started = init(&env.backups, &env.jobs, &SnapshotRef::Latest).await.unwrap();
        let reports = run_to_end(&failing, &env, &started.job_id, 50).await;
        assert_eq!(reports.last().unwrap().skipped, 0);

        let columns: Vec<String> = env
            .driver()
            .list_columns("typecho_contents")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert!(columns.contains(&"extra_meta".to_string()));
        assert!(!columns.contains(&"broken_flag".to_string()));

        let rows = query(
            env.driver(),
            "SELECT cid, title, extra_meta FROM typecho_contents ORDER BY cid",
            &[],
        )
        .await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["extra_meta"], json!("hello"));
        assert_eq!(rows[1]["extra_meta"], json!(null));

        let moods = column(env.driver(), "SELECT mood FROM typecho_comments", "mood").await;
        assert_eq!(moods, vec![3]);
    }

    #[tokio::test]
    async fn test_failing_item_is_skipped() {
        let env = TestEnv::new().await;
        seed_blog(&env).await;
        env.backups
            .snapshot(env.driver(), &env.tables, SnapshotScope::All)
            .await
            .unwrap();
        clear_store(env.driver()).await;

        let failing = FailingDriver::new(Arc::clone(&env.driver))
            .fail_sql_containing(r#"INSERT INTO "typecho_relationships""#);
        let started = init(&env.backups, &env.jobs, &SnapshotRef::Latest).await.unwrap();
        let reports = run_to_end(&failing, &env, &started.job_id, 200).await;

        assert_eq!(reports[0].skipped, 2);
        assert!(reports[0].progress.done);
        assert_eq!(content_ids(env.driver()).await, vec![1, 3, 4, 6]);
        let relationships =
            column(env.driver(), "SELECT cid FROM typecho_relationships", "cid").await;
        assert!(relationships.is_empty());
        let comments = column(
            env.driver(),
            "SELECT coid FROM typecho_comments ORDER BY coid",
            "coid",
        )
        .await;
        assert_eq!(comments, vec![10, 11]);
    }

    #[tokio::test]
    async fn test_failed_batch_keeps_cursors_and_retries_same_window() {
        let env = TestEnv::new().await;
        seed_blog(&env).await;
        env.backups
            .snapshot(env.driver(), &env.tables, SnapshotScope::All)
            .await
            .unwrap();
        clear_store(env.driver()).await;

        let started = init(&env.backups, &env.jobs, &SnapshotRef::Latest).await.unwrap();
        let failing =
            FailingDriver::new(Arc::clone(&env.driver)).fail_sql_containing("SAVEPOINT");

        let result = step(
            &failing,
            &env.tables,
            &env.backups,
            &env.jobs,
            &started.job_id,
            2,
        )
        .await;
        assert!(matches!(result, Err(AppError::Storage(_))));

        let state = env.jobs.load(&started.job_id).await.unwrap();
        assert_eq!(state.cursors.records, 0);
        assert_eq!(state.cursors.refs, 0);
        assert!(content_ids(env.driver()).await.is_empty());

        let report = step(
            env.driver(),
            &env.tables,
            &env.backups,
            &env.jobs,
            &started.job_id,
            2,
        )
        .await
        .unwrap();
        assert_eq!(report.progress.processed, 2);
        assert!(!report.progress.done);
        assert_eq!(content_ids(env.driver()).await, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_sequences_follow_restored_ids() {
        let env = TestEnv::new().await;
        seed_blog(&env).await;
        env.backups
            .snapshot(env.driver(), &env.tables, SnapshotScope::All)
            .await
            .unwrap();
        clear_store(env.driver()).await;
        exec(env.driver(), "DELETE FROM sqlite_sequence", &[]).await;

        let started = init(&env.backups, &env.jobs, &SnapshotRef::Latest).await.unwrap();
        run_to_end(env.driver(), &env, &started.job_id, 200).await;

        exec(
            env.driver(),
            "INSERT INTO typecho_contents (title, type) VALUES ('fresh', 'post')",
            &[],
        )
        .await;
        let fresh = column(
            env.driver(),
            "SELECT cid FROM typecho_contents WHERE title = 'fresh'",
            "cid",
        )
        .await;
        assert_eq!(fresh, vec![7]);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let env = TestEnv::new().await;
        let job_id = JobId::parse("missing-job").unwrap();

        let result = step(env.driver(), &env.tables, &env.backups, &env.jobs, &job_id, 10).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_corrupt_job_file() {
        let env = TestEnv::new().await;
        let job_id = JobId::parse("broken").unwrap();
        let path = env.jobs.path(&job_id);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, "{\"snapshotRef\": 12").await.unwrap();

        let result = step(env.driver(), &env.tables, &env.backups, &env.jobs, &job_id, 10).await;

        assert!(matches!(result, Err(AppError::CorruptJobState(_))));
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_rejected() {
        let env = TestEnv::new().await;
        seed_blog(&env).await;
        env.backups
            .snapshot(env.driver(), &env.tables, SnapshotScope::All)
            .await
            .unwrap();
        let started = init(&env.backups, &env.jobs, &SnapshotRef::Latest).await.unwrap();

        let result = step(
            env.driver(),
            &env.tables,
            &env.backups,
            &env.jobs,
            &started.job_id,
            0,
        )
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(env.jobs.path(&started.job_id).exists());
    }

    #[tokio::test]
    async fn test_init_without_backups() {
        let env = TestEnv::new().await;

        let result = init(&env.backups, &env.jobs, &SnapshotRef::Latest).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_malformed_snapshot_is_rejected_at_init() {
        let env = TestEnv::new().await;
        write_snapshot_file(
            &env,
            "AMD_backup_20240101_01.json",
            json!({
                "version": "2.0",
                "records": [{"cid": "x", "type": "post"}],
                "referenceRows": []
            }),
        )
        .await;

        let result = init(&env.backups, &env.jobs, &SnapshotRef::Latest).await;

        assert!(matches!(result, Err(AppError::MalformedData(_))));
    }
}
