//! End-to-end orchestration scenarios against a scripted completion client.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use coordination::{
    AgentRole, EscalationPolicy, EventKind, MemoryEventSink, SessionState, TokenLedger,
    TokenPricing,
};
use triad_agents::{AgentError, CompletionError, CompletionResponse, Orchestrator, SessionReport};

#[tokio::test]
async fn scenario_a_immediate_success() {
    let client = ScriptedClient::new(vec![plan(500), work("final essay", 800), approve(600)]);
    let orchestrator = Orchestrator::new(client.clone(), limits());

    let report = orchestrator.run("Write a 300-word essay").await.unwrap();

    assert_eq!(report.status, SessionState::Succeeded);
    assert_eq!(report.iterations, 1);
    assert_eq!(report.tokens_used, 1_900);
    assert_eq!(report.plan_version, 1);
    assert_eq!(report.agent_calls, 3);
    assert_eq!(report.result.as_deref(), Some("final essay"));
    assert_eq!(
        client.roles(),
        vec![AgentRole::Planner, AgentRole::Worker, AgentRole::Reviewer]
    );
}

#[tokio::test]
async fn scenario_b_revise_then_succeed() {
    let client = ScriptedClient::new(vec![
        plan(500),
        work("draft", 800),
        reject("Too short, add examples", 600),
        work("draft with examples", 800),
        approve(600),
    ]);
    let orchestrator = Orchestrator::new(client.clone(), limits());
    let mut session = orchestrator.new_session("Write a 300-word essay");

    let status = orchestrator.drive(&mut session).await.unwrap();

    assert_eq!(status, SessionState::Succeeded);
    assert_eq!(session.iteration(), 2);
    assert_eq!(session.plan_version(), 1);
    assert_eq!(session.worker_attempts(), 2);
    assert_eq!(session.outcome().result.as_deref(), Some("draft with examples"));

    // The revision sees the reviewer's feedback; the first attempt does not.
    assert!(!client.user_prompt(1).contains("LATEST REVIEWER FEEDBACK"));
    let revision = client.user_prompt(3);
    assert!(revision.contains("LATEST REVIEWER FEEDBACK:\nToo short, add examples"));
    assert!(revision.contains("PREVIOUS ATTEMPTS AND FEEDBACK"));
}

#[tokio::test]
async fn scenario_c_two_rejections_trigger_replan() {
    let client = ScriptedClient::new(vec![
        plan(500),
        work("v1", 800),
        reject("off topic", 600),
        work("v2", 800),
        reject("still off topic", 600),
        plan(500),
        work("v3", 800),
        approve(600),
    ]);
    let sink = Arc::new(MemoryEventSink::new());
    let orchestrator = Orchestrator::new(client.clone(), limits()).with_event_sink(sink.clone());
    let mut session = orchestrator.new_session("Write a 300-word essay");

    let status = orchestrator.drive(&mut session).await.unwrap();

    assert_eq!(status, SessionState::Succeeded);
    assert_eq!(session.plan_version(), 2);
    assert_eq!(session.replans(), 1);
    assert_eq!(session.worker_attempts(), 1);
    assert_eq!(session.iteration(), 3);
    assert_eq!(session.outcome().result.as_deref(), Some("v3"));

    // Re-plan prompt carries the full history.
    let replan = client.user_prompt(5);
    assert!(replan.contains("PREVIOUS PLAN FAILED"));
    assert!(replan.contains("still off topic"));

    let states: Vec<SessionState> = session.transitions().iter().map(|t| t.to).collect();
    assert!(states.contains(&SessionState::Escalating));
    assert_eq!(
        sink.events()
            .iter()
            .filter(|e| e.event_type == EventKind::Escalation)
            .count(),
        1
    );
}

#[tokio::test]
async fn scenario_d_quality_failure_without_replan() {
    let client = ScriptedClient::new(vec![
        plan(500),
        work("a1", 800),
        reject("no", 600),
        work("a2", 800),
        reject("no", 600),
        work("a3", 800),
        reject("no", 600),
    ]);
    let orchestrator = Orchestrator::new(client.clone(), limits()).with_escalation(
        EscalationPolicy {
            max_replans: 0,
            ..EscalationPolicy::default()
        },
    );

    let report = orchestrator.run("Write a 300-word essay").await.unwrap();

    assert_eq!(report.status, SessionState::FailedQuality);
    assert!(report.result.is_none());
    assert_eq!(report.plan_version, 1);
    assert_eq!(report.iterations, 3);
    assert!(report.recommendation().is_some());
    assert_eq!(client.remaining(), 0);
}

#[tokio::test]
async fn quality_failure_after_replan_is_spent() {
    let mut script = vec![plan(100)];
    for _ in 0..2 {
        script.push(work("x", 100));
        script.push(reject("no", 100));
    }
    script.push(plan(100));
    for _ in 0..3 {
        script.push(work("y", 100));
        script.push(reject("no", 100));
    }
    let client = ScriptedClient::new(script);
    let orchestrator = Orchestrator::new(client.clone(), limits());

    let report = orchestrator.run("task").await.unwrap();

    assert_eq!(report.status, SessionState::FailedQuality);
    assert_eq!(report.plan_version, 2);
    assert_eq!(report.iterations, 5);
    assert_eq!(report.agent_calls, 12);
    assert_eq!(client.remaining(), 0);
}

#[tokio::test]
async fn scenario_e_budget_failure_stops_before_next_cycle() {
    let client = ScriptedClient::new(vec![
        plan(500),
        work("draft", 800),
        reject("needs work", 600),
        work("never used", 800),
        approve(600),
    ]);
    let orchestrator = Orchestrator::new(client.clone(), limits_with_budget(1_500));

    let report = orchestrator.run("task").await.unwrap();

    assert_eq!(report.status, SessionState::FailedBudget);
    assert!(report.result.is_none());
    assert_eq!(client.requests().len(), 3);
    assert_eq!(client.remaining(), 2);
    assert!(report.reason.unwrap().contains("1900/1500"));
}

#[tokio::test]
async fn budget_ceiling_is_inclusive() {
    let client = ScriptedClient::new(vec![
        plan(500),
        work("draft", 800),
        reject("needs work", 600),
        work("better", 800),
        approve(600),
    ]);
    let orchestrator = Orchestrator::new(client.clone(), limits_with_budget(1_900));

    let report = orchestrator.run("task").await.unwrap();

    assert_eq!(report.tokens_used, 1_900);
    assert_eq!(report.status, SessionState::FailedBudget);
}

#[tokio::test]
async fn one_token_under_ceiling_keeps_going() {
    let client = ScriptedClient::new(vec![
        plan(500),
        work("draft", 800),
        reject("needs work", 600),
        work("better", 800),
        approve(600),
    ]);
    let sink = Arc::new(MemoryEventSink::new());
    let orchestrator = Orchestrator::new(client.clone(), limits_with_budget(1_901))
        .with_event_sink(sink.clone());

    let report = orchestrator.run("task").await.unwrap();

    assert_eq!(report.status, SessionState::Succeeded);
    assert_eq!(report.tokens_used, 3_300);
    assert!(sink
        .events()
        .iter()
        .any(|e| e.event_type == EventKind::BudgetWarning));
}

#[tokio::test]
async fn budget_warning_repeats_at_every_gate() {
    let client = ScriptedClient::new(vec![
        plan(800),
        work("draft", 50),
        reject("tighten it", 50),
        work("tight", 40),
        approve(40),
    ]);
    let sink = Arc::new(MemoryEventSink::new());
    let orchestrator = Orchestrator::new(client.clone(), limits_with_budget(1_000))
        .with_event_sink(sink.clone());

    let report = orchestrator.run("task").await.unwrap();

    assert_eq!(report.status, SessionState::Succeeded);
    let warnings: Vec<u64> = sink
        .events()
        .iter()
        .filter(|e| e.event_type == EventKind::BudgetWarning)
        .map(|e| e.total_tokens)
        .collect();
    assert_eq!(warnings, vec![800, 900]);
}

#[tokio::test]
async fn oversized_usage_report_fails_budget_without_overflow() {
    let client = ScriptedClient::new(vec![Step::Reply(CompletionResponse {
        text: "1. Do it".into(),
        prompt_tokens: u64::MAX,
        completion_tokens: 1,
    })]);
    let orchestrator = Orchestrator::new(client.clone(), limits_with_budget(1_000));

    let report = orchestrator.run("task").await.unwrap();

    assert_eq!(report.status, SessionState::FailedBudget);
    assert_eq!(report.tokens_used, u64::MAX);
    assert_eq!(client.requests().len(), 1);
}

#[tokio::test]
async fn planner_alone_can_exhaust_budget() {
    let client = ScriptedClient::new(vec![plan(2_000)]);
    let orchestrator = Orchestrator::new(client.clone(), limits_with_budget(1_000));

    let report = orchestrator.run("task").await.unwrap();

    assert_eq!(report.status, SessionState::FailedBudget);
    assert_eq!(report.iterations, 0);
    assert_eq!(client.roles(), vec![AgentRole::Planner]);
}

#[tokio::test]
async fn iteration_limit_fails_session() {
    let client = ScriptedClient::new(vec![
        plan(100),
        work("a", 100),
        reject("no", 100),
        work("b", 100),
        reject("no", 100),
    ]);
    let mut limits = limits();
    limits.max_iterations = 2;
    let orchestrator = Orchestrator::new(client.clone(), limits).with_escalation(EscalationPolicy {
        max_replans: 0,
        ..EscalationPolicy::default()
    });

    let report = orchestrator.run("task").await.unwrap();

    assert_eq!(report.status, SessionState::FailedIterations);
    assert_eq!(report.iterations, 2);
    assert!(report.to_string().contains("Human escalation required"));
}

#[tokio::test]
async fn session_invariants_hold_across_replan() {
    let client = ScriptedClient::new(vec![
        plan(500),
        work("v1", 800),
        reject("no", 600),
        work("v2", 800),
        reject("no", 600),
        plan(450),
        work("v3", 700),
        approve(650),
    ]);
    let orchestrator = Orchestrator::new(client.clone(), limits());
    let mut session = orchestrator.new_session("task");
    orchestrator.drive(&mut session).await.unwrap();

    let entries = session.history().entries();

    // One entry per completion call, in call order.
    assert_eq!(entries.len(), client.requests().len());
    let roles: Vec<AgentRole> = entries.iter().map(|e| e.role).collect();
    assert_eq!(roles, client.roles());

    // Token total is the exact sum of per-call usage.
    let sum: u64 = entries.iter().map(|e| e.tokens).sum();
    assert_eq!(session.tokens_used(), sum);
    assert_eq!(sum, 5_100);

    // Every plan is followed by attempt number 1.
    for (i, entry) in entries.iter().enumerate() {
        if entry.role == AgentRole::Planner {
            let next_worker = entries[i + 1..]
                .iter()
                .find(|e| e.role == AgentRole::Worker)
                .unwrap();
            assert_eq!(next_worker.round, 1);
        }
    }
}

#[tokio::test]
async fn identical_scripts_give_identical_outcomes() {
    let script = || {
        vec![
            plan(500),
            work("v1", 800),
            reject("no", 600),
            work("v2", 800),
            approve(600),
        ]
    };

    let first = Orchestrator::new(ScriptedClient::new(script()), limits())
        .run("task")
        .await
        .unwrap();
    let second = Orchestrator::new(ScriptedClient::new(script()), limits())
        .run("task")
        .await
        .unwrap();

    assert_eq!(first.status, second.status);
    assert_eq!(first.iterations, second.iterations);
    assert_eq!(first.tokens_used, second.tokens_used);
    assert_eq!(first.result, second.result);
}

#[tokio::test]
async fn driving_a_finished_session_is_a_no_op() {
    let client = ScriptedClient::new(vec![plan(500), work("done", 800), approve(600)]);
    let orchestrator = Orchestrator::new(client.clone(), limits());
    let mut session = orchestrator.new_session("task");

    orchestrator.drive(&mut session).await.unwrap();
    let again = orchestrator.drive(&mut session).await.unwrap();

    assert_eq!(again, SessionState::Succeeded);
    assert_eq!(client.requests().len(), 3);
    assert_eq!(session.tokens_used(), 1_900);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_is_retried_once_after_backoff() {
    let client = ScriptedClient::new(vec![
        rate_limited(),
        plan(500),
        work("done", 800),
        approve(600),
    ]);
    let orchestrator = Orchestrator::new(client.clone(), limits());

    let start = tokio::time::Instant::now();
    let report = orchestrator.run("task").await.unwrap();

    assert!(start.elapsed() >= Duration::from_secs(2));
    assert_eq!(report.status, SessionState::Succeeded);
    assert_eq!(client.requests().len(), 4);
    // The failed call consumed nothing.
    assert_eq!(report.tokens_used, 1_900);
    assert_eq!(report.agent_calls, 3);
}

#[tokio::test(start_paused = true)]
async fn second_transient_failure_aborts() {
    let client = ScriptedClient::new(vec![plan(500), rate_limited(), rate_limited()]);
    let orchestrator = Orchestrator::new(client.clone(), limits());
    let mut session = orchestrator.new_session("task");

    let err = orchestrator.drive(&mut session).await.unwrap_err();

    assert!(err.is_transient());
    assert_eq!(err.role(), Some(AgentRole::Worker));
    assert_eq!(session.status(), SessionState::Aborted);
    assert_eq!(client.requests().len(), 3);
    assert!(session.outcome().result.is_none());
}

#[tokio::test]
async fn non_transient_failure_is_not_retried() {
    let client = ScriptedClient::new(vec![
        plan(500),
        Step::Fail(CompletionError::InvalidRequest("context length exceeded".into())),
        work("never used", 800),
    ]);
    let orchestrator = Orchestrator::new(client.clone(), limits());
    let mut session = orchestrator.new_session("task");

    let err = orchestrator.drive(&mut session).await.unwrap_err();

    assert!(matches!(
        err,
        AgentError::Completion {
            role: AgentRole::Worker,
            source: CompletionError::InvalidRequest(_),
        }
    ));
    assert_eq!(client.requests().len(), 2);
    assert_eq!(session.status(), SessionState::Aborted);
    assert!(session
        .failure_reason()
        .unwrap()
        .contains("context length exceeded"));
}

#[tokio::test]
async fn aborted_session_still_yields_a_report() {
    let client = ScriptedClient::new(vec![
        plan(500),
        Step::Fail(CompletionError::InvalidRequest("model not found".into())),
    ]);
    let orchestrator = Orchestrator::new(client.clone(), limits());
    let mut session = orchestrator.new_session("task");

    assert!(orchestrator.drive(&mut session).await.is_err());
    let report = SessionReport::from_session(&session, &TokenPricing::default());

    assert_eq!(report.status, SessionState::Aborted);
    assert_eq!(report.tokens_used, 500);
    assert!(report.reason.as_deref().unwrap().contains("model not found"));
    assert!(report.recommendation().is_some());
    assert!(report.to_string().contains("Human escalation required"));
}

#[tokio::test]
async fn malformed_verdict_aborts_but_is_recorded() {
    let client = ScriptedClient::new(vec![
        plan(500),
        work("draft", 800),
        reply("APPROVED: YES\nFEEDBACK: looks fine", 600),
    ]);
    let sink = Arc::new(MemoryEventSink::new());
    let orchestrator = Orchestrator::new(client.clone(), limits()).with_event_sink(sink.clone());
    let mut session = orchestrator.new_session("task");

    let err = orchestrator.drive(&mut session).await.unwrap_err();

    assert!(matches!(err, AgentError::MalformedVerdict { .. }));
    assert_eq!(session.status(), SessionState::Aborted);
    assert_eq!(session.history().len(), 3);
    assert_eq!(session.tokens_used(), 1_900);
    let last = session.history().last().unwrap();
    assert_eq!(last.role, AgentRole::Reviewer);
    assert_eq!(last.approved, None);

    let reviewer_event = sink
        .events()
        .into_iter()
        .find(|e| e.event_type == EventKind::ReviewerCall)
        .unwrap();
    assert_eq!(reviewer_event.payload["malformed_verdict"], true);
    assert_eq!(
        sink.events().last().unwrap().event_type,
        EventKind::SessionEnded
    );
}

#[tokio::test]
async fn events_follow_the_call_sequence() {
    let client = ScriptedClient::new(vec![plan(500), work("done", 800), approve(600)]);
    let sink = Arc::new(MemoryEventSink::new());
    let orchestrator = Orchestrator::new(client, limits()).with_event_sink(sink.clone());

    let report = orchestrator.run("task").await.unwrap();

    let events = sink.events();
    let kinds: Vec<EventKind> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::SessionStarted,
            EventKind::PlannerCall,
            EventKind::WorkerCall,
            EventKind::ReviewerCall,
            EventKind::SessionEnded,
        ]
    );
    assert!(events.iter().all(|e| e.session_id == report.session_id));
    assert_eq!(events[2].tokens, Some(800));
    assert_eq!(events[4].total_tokens, 1_900);
    assert_eq!(events[4].payload["status"], "succeeded");
}

#[tokio::test]
async fn concurrent_sessions_share_a_ledger() {
    let ledger = TokenLedger::new();
    let make = |text: &str| {
        Orchestrator::new(
            ScriptedClient::new(vec![plan(500), work(text, 800), approve(600)]),
            limits(),
        )
        .with_ledger(Arc::clone(&ledger))
    };
    let left = make("left");
    let right = make("right");

    let (a, b) = tokio::join!(left.run("task a"), right.run("task b"));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.session_id, b.session_id);
    assert_eq!(a.tokens_used, 1_900);
    assert_eq!(b.tokens_used, 1_900);
    assert_eq!(ledger.total(), 3_800);
}

#[tokio::test]
async fn requests_use_role_temperatures() {
    let client = ScriptedClient::new(vec![plan(10), work("w", 10), approve(10)]);
    let orchestrator = Orchestrator::new(client.clone(), limits()).with_temperatures(
        triad_agents::RoleTemperatures {
            reviewer: 0.0,
            ..Default::default()
        },
    );

    orchestrator.run("task").await.unwrap();

    let temps: Vec<f32> = client.requests().iter().map(|r| r.temperature).collect();
    assert_eq!(temps, vec![0.7, 0.7, 0.0]);
}
