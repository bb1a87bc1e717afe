//! Cross-component integration coverage for the assembled [`Context`].
//!
//! The individual component crates already cover §8's S1-S6 scenarios
//! against their own unit boundaries (OCC retry, lock sweep, merge
//! conflicts, policy gate, idempotent replay). What's missing — and
//! what only this crate can exercise — is the full write path §2
//! describes: policy gate -> OCC engine -> outbox -> audit, wired
//! through one `Context` the way a real caller would drive it.

use oms_app::{AppConfig, InMemoryContext};
use oms_audit::event::{Actor, AuditEvent, Changes, Compliance, Target};
use oms_auth::{AuthMethod, UserContext};
use oms_core::author::secure_author;
use oms_policy::gate::{EmergencyOverrideAttempt, PolicyRequest};
use serde_json::json;

fn dev_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.jwt.secret = Some("test-secret-at-least-32-bytes-long!!".to_string());
    config
}

fn developer() -> UserContext {
    UserContext {
        user_id: "u1".into(),
        username: "alice".into(),
        email: None,
        roles: vec!["developer".into()],
        tenant: None,
        scopes: Vec::new(),
        auth_method: AuthMethod::Jwt,
        session: None,
        ip: None,
        ua: None,
        is_service_account: false,
    }
}

/// Policy gate authorizes a create, OCC engine commits it, the outbox
/// relay delivers the resulting event, and the audit emitter enqueues
/// its own record of the write — all through one `Context`.
#[tokio::test]
async fn authorized_write_flows_through_policy_occ_outbox_and_audit() {
    let ctx = InMemoryContext::in_memory(dev_config());
    let user = developer();

    let decision = ctx
        .policy
        .authorize(&PolicyRequest {
            method: "PUT".to_string(),
            path: "/api/v1/schemas/main/object-types/Product".to_string(),
            user: Some(user.clone()),
            branch: Some("main".to_string()),
            issue_id: Some("OMS-123".to_string()),
            emergency_override: None,
        })
        .await
        .expect("a recognized issue reference clears the PUT route's issue requirement");
    assert!(decision.allow);

    let author = secure_author(&user.username, &user.user_id, &user.roles, user.tenant.as_deref(), user.is_service_account, ctx.config.jwt.secret.as_deref());

    let outcome = ctx
        .occ
        .update(
            "main",
            "object_type",
            "Product",
            None,
            |_current| Ok(json!({"name": "Product", "description": "v1"})),
            author.as_str(),
            "create Product",
            0,
            true,
        )
        .await
        .expect("first write against an unseen resource always succeeds");
    assert_eq!(outcome.version, 1);
    assert!(outcome.parent_commit.is_none());

    let envelope = oms_outbox::EventEnvelope::new("object_type.created", "oms", "1.0.0", outcome.new_commit.clone(), outcome.result.clone());
    ctx.outbox
        .enqueue("Product", "oms.object_type.created.main", envelope)
        .await
        .expect("outbox write in the same scope as the business commit never fails here");

    let ts = chrono::Utc::now();
    let audit_event = AuditEvent {
        id: AuditEvent::compute_id("create", "object_type", "Product", &ts, Some(&outcome.new_commit)),
        event_type: oms_audit::event::AUDIT_EVENT_TYPE.to_string(),
        source: oms_audit::event::AUDIT_SOURCE.to_string(),
        action: "create".to_string(),
        actor: Actor::from(&user),
        target: Target {
            resource_type: "object_type".to_string(),
            resource_id: "Product".to_string(),
            branch: Some("main".to_string()),
            parent: None,
        },
        success: true,
        error_code: None,
        duration_ms: Some(4),
        changes: Changes {
            commit_before: None,
            commit_after: Some(outcome.new_commit.clone()),
            fields_changed: vec!["name".into(), "description".into()],
            old: json!(null),
            new: outcome.result.clone(),
        },
        compliance: Compliance {
            pii_fields: Vec::new(),
            gdpr_relevant: false,
            retention_days: 365,
        },
        request_id: "req-1".to_string(),
        correlation_id: outcome.new_commit.clone(),
        time: ts,
    };
    ctx.audit.emit(audit_event).await.expect("audit emission via the outbox must succeed for the write to be considered durable");

    let (delivered, failed) = oms_outbox::relay::relay_once(ctx.outbox.as_ref(), ctx.bus.as_ref(), 10).await;
    assert_eq!(failed, 0);
    assert_eq!(delivered, 2, "both the business event and the audit event relay in one pass");

    let published = ctx.bus.published_on("oms.object_type.created.main");
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].payload["name"], "Product");

    let audit_stream = "oms.audit.create";
    let audit_published = ctx.bus.published_on(audit_stream);
    assert_eq!(audit_published.len(), 1);
}

/// A delete without an issue reference falls back to the emergency
/// override path; once approved, the retry through the same `Context`
/// succeeds and the branch lock acquired for the structural change is
/// released cleanly afterward.
#[tokio::test]
async fn denied_destructive_write_recovers_via_emergency_override_and_lock_release() {
    let ctx = InMemoryContext::in_memory(dev_config());
    let user = developer();

    let denied = ctx
        .policy
        .authorize(&PolicyRequest {
            method: "DELETE".to_string(),
            path: "/api/v1/branches/main".to_string(),
            user: Some(user.clone()),
            branch: Some("main".to_string()),
            issue_id: None,
            emergency_override: None,
        })
        .await;
    assert!(denied.is_err());

    let pending = oms_policy::override_request::OverrideRequest::new(
        "u1",
        vec!["developer".to_string()],
        "BRANCH",
        "DELETE",
        "emergency",
        "main",
        "rolling back a bad deploy before the next business day, approved over the phone with on-call lead",
    );
    ctx.overrides.put(pending.clone()).await;
    let approved = oms_policy::override_request::approve(&ctx.overrides, pending.id, "admin1", &["admin".to_string()])
        .await
        .expect("admin role may approve");

    let allowed = ctx
        .policy
        .authorize(&PolicyRequest {
            method: "DELETE".to_string(),
            path: "/api/v1/branches/main".to_string(),
            user: Some(user.clone()),
            branch: Some("main".to_string()),
            issue_id: None,
            emergency_override: Some(EmergencyOverrideAttempt {
                justification: "rolling back a bad deploy before the next business day, approved over the phone with on-call lead".to_string(),
                override_token: approved.override_token.clone().expect("approve() always assigns a token"),
            }),
        })
        .await
        .expect("approved override with a matching token permits the delete");
    assert!(allowed.allow);
    assert!(allowed.override_used.is_some());

    let author = secure_author(&user.username, &user.user_id, &user.roles, user.tenant.as_deref(), user.is_service_account, ctx.config.jwt.secret.as_deref());
    let lock_id = ctx
        .locks
        .acquire(oms_locks::lock::AcquireRequest {
            branch: "main".to_string(),
            lock_type: oms_types::LockType::Maintenance,
            scope: oms_types::LockScope::ResourceType,
            resource_type: Some("object_type".to_string()),
            resource_id: None,
            locked_by: author.as_str().to_string(),
            reason: "deleting branch main under emergency override".to_string(),
            ttl: None,
            heartbeat_interval_s: None,
            auto_release: true,
        })
        .await
        .expect("no competing holder for this branch/resource-type scope");

    ctx.locks.release(lock_id, author.as_str()).await.expect("the holder that acquired a lock may always release it");
}
