//! Sample records shared by adapter tests.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use jit_domain::{
    AccessDuration, AccessJob, AccessPermission, AccessRequest, CleanupPolicy, Cluster,
    ClusterInput, EmailAddress, Environment, NewAccessRequest, UserId,
};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(|| unreachable!())
}

pub fn cluster(name: &str) -> Cluster {
    Cluster::new(
        format!("id-{name}"),
        ClusterInput {
            name: name.to_owned(),
            display_name: None,
            account: "123456789012".to_owned(),
            region: "us-east-1".to_owned(),
            environment: Environment::Development,
            max_duration: None,
            required_approvers_count: 0,
            enabled: true,
        },
    )
    .unwrap_or_else(|_| unreachable!())
}

pub fn request(id: &str, requester: &str, offset_minutes: i64) -> AccessRequest {
    AccessRequest::new(NewAccessRequest {
        id: id.to_owned(),
        requester_id: UserId::new(requester).unwrap_or_else(|_| unreachable!()),
        requester_email: EmailAddress::new("dev@example.com").unwrap_or_else(|_| unreachable!()),
        target: cluster("dev-east-1").target(),
        reason: "debugging ticket 4217".to_owned(),
        duration: AccessDuration::DEFAULT,
        permissions: vec![AccessPermission::View],
        namespaces: Vec::new(),
        required_approvers: Vec::new(),
        created_at: now() + TimeDelta::minutes(offset_minutes),
    })
    .unwrap_or_else(|_| unreachable!())
}

/// Returns a `Creating` job with its session name fixed.
pub fn creating_job(id: &str, request: &AccessRequest) -> AccessJob {
    creating_job_at(id, request, now())
}

/// Returns a `Creating` job whose window starts at `started_at`.
pub fn creating_job_at(
    id: &str,
    request: &AccessRequest,
    started_at: DateTime<Utc>,
) -> AccessJob {
    let mut job = AccessJob::for_request(
        id,
        request,
        "arn:aws:iam::123456789012:role/jit-access",
        CleanupPolicy::OnDelete,
        now(),
    );
    let _ = job.begin_creating(started_at);
    job
}

/// Start time unlikely to collide with rows left by earlier runs.
pub fn unique_start() -> DateTime<Utc> {
    now() + TimeDelta::seconds(i64::from(Uuid::new_v4().as_fields().0))
}

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Connects to `DATABASE_URL` and applies migrations; `None` skips the test.
pub async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres adapter tests: {error}");
    }

    Some(pool)
}

/// Returns an id unique to one test run.
pub fn unique_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}
