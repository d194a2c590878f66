mod common;

// std
use std::{sync::Arc, time::Duration};
// crates.io
use tokio::time::{self, Instant};
// self
use common::ScriptedInteractive;
use graph_auth_broker::{
	coalesce::{CoalescerOptions, InteractionCoalescer},
	error::Error,
};

fn coalescer(fetcher: &Arc<ScriptedInteractive>) -> InteractionCoalescer {
	InteractionCoalescer::new(fetcher.clone(), CoalescerOptions::default())
}

fn scopes(values: &[&str]) -> Vec<String> {
	values.iter().map(|value| value.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn overlapping_requests_share_one_round_and_token() {
	let fetcher = Arc::new(ScriptedInteractive::new());
	let coalescer = coalescer(&fetcher);
	let tasks = (0..5)
		.map(|_| {
			let coalescer = coalescer.clone();

			tokio::spawn(async move { coalescer.acquire_interactive(["Mail.Read"]).await })
		})
		.collect::<Vec<_>>();
	let mut tokens = Vec::new();

	for task in tasks {
		let token = task
			.await
			.expect("Caller task should not panic.")
			.expect("Coalesced round should succeed.");

		tokens.push(token.expose().to_owned());
	}

	assert_eq!(fetcher.round_count(), 1);
	assert!(tokens.iter().all(|token| token == "round-1:mail.read"), "{tokens:?}");
	assert_eq!(coalescer.metrics().requests(), 5);
	assert_eq!(coalescer.metrics().joined(), 4);
	assert_eq!(coalescer.metrics().rounds(), 1);
}

#[tokio::test(start_paused = true)]
async fn disjoint_requests_inside_the_window_share_one_round() {
	let fetcher = Arc::new(ScriptedInteractive::new());
	let coalescer = coalescer(&fetcher);
	let first = coalescer.enqueue(["a"]).expect("First request should queue.");

	time::sleep(Duration::from_millis(50)).await;

	let second = coalescer.enqueue(["b"]).expect("Second request should queue.");

	time::sleep(Duration::from_millis(50)).await;

	let third = coalescer.enqueue(["c"]).expect("Third request should queue.");

	assert!(!first.shares_interaction_with(&second));
	assert_eq!(coalescer.pending_interactions(), 3);

	let first = first.wait().await.expect("First caller should get the round token.");
	let second = second.wait().await.expect("Second caller should get the round token.");
	let third = third.wait().await.expect("Third caller should get the round token.");

	assert_eq!(fetcher.rounds(), vec![scopes(&["a", "b", "c"])]);
	assert_eq!(first.expose(), "round-1:a b c");
	assert_eq!(first, second);
	assert_eq!(second, third);
}

#[tokio::test(start_paused = true)]
async fn requests_during_a_round_wait_for_one_follow_up_round() {
	let fetcher = Arc::new(ScriptedInteractive::new().with_delay(Duration::from_secs(1)));
	let coalescer = coalescer(&fetcher);
	let first = coalescer.enqueue(["a"]).expect("First request should queue.");

	time::sleep(Duration::from_millis(300)).await;

	assert!(coalescer.is_interaction_in_flight());
	assert!(coalescer.pending_scopes().is_empty());

	let second = coalescer.enqueue(["b"]).expect("Second request should queue.");
	let third = coalescer.enqueue(["c"]).expect("Third request should queue.");

	// The window for the queued scopes closes while the first round is still running.
	time::sleep(Duration::from_millis(300)).await;

	assert_eq!(fetcher.round_count(), 1);
	assert_eq!(coalescer.pending_scopes(), scopes(&["b", "c"]));

	assert_eq!(first.wait().await.expect("First round should succeed.").expose(), "round-1:a");
	assert_eq!(second.wait().await.expect("Follow-up should succeed.").expose(), "round-2:b c");
	assert_eq!(third.wait().await.expect("Follow-up should succeed.").expose(), "round-2:b c");
	assert_eq!(fetcher.rounds(), vec![scopes(&["a"]), scopes(&["b", "c"])]);
	assert_eq!(fetcher.max_concurrent(), 1);
	assert!(!coalescer.is_interaction_in_flight());
}

#[tokio::test(start_paused = true)]
async fn failed_round_rejects_every_caller_and_resets() {
	let fetcher = Arc::new(ScriptedInteractive::new());
	let coalescer = coalescer(&fetcher);

	fetcher.fail_next("user_cancelled");

	let first = coalescer.enqueue(["mail.read"]).expect("First request should queue.");
	let second = coalescer.enqueue(["calendars.read"]).expect("Second request should queue.");

	for ticket in [first, second] {
		match ticket.wait().await {
			Err(Error::InteractionFailed(e)) => assert_eq!(e.code, "user_cancelled"),
			other => panic!("Unexpected outcome: {other:?}."),
		}
	}

	assert!(!coalescer.is_interaction_in_flight());
	assert!(coalescer.pending_scopes().is_empty());
	assert_eq!(coalescer.metrics().round_failures(), 1);

	let token = coalescer
		.acquire_interactive(["mail.read"])
		.await
		.expect("A fresh round should start after a failure.");

	assert_eq!(token.expose(), "round-2:mail.read");
}

#[tokio::test(start_paused = true)]
async fn late_superset_request_joins_and_extends_the_round() {
	let fetcher = Arc::new(ScriptedInteractive::new());
	let coalescer = coalescer(&fetcher);
	let started = Instant::now();
	let caller_a = coalescer.enqueue(["mail.read"]).expect("Caller A should queue.");

	time::sleep(Duration::from_millis(50)).await;

	let caller_b =
		coalescer.enqueue(["mail.read", "calendars.read"]).expect("Caller B should queue.");

	assert!(caller_a.shares_interaction_with(&caller_b));

	let token_a = caller_a.wait().await.expect("Caller A should get a token.");
	let elapsed = started.elapsed();
	let token_b = caller_b.wait().await.expect("Caller B should get a token.");

	assert_eq!(fetcher.rounds(), vec![scopes(&["mail.read", "calendars.read"])]);
	assert_eq!(token_a, token_b);
	// The quiet period restarts when caller B adds a scope.
	assert!(elapsed >= Duration::from_millis(250), "{elapsed:?}");
	assert!(elapsed < Duration::from_millis(300), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn settled_rounds_are_never_reused() {
	let fetcher = Arc::new(ScriptedInteractive::new());
	let coalescer = coalescer(&fetcher);
	let caller_a = coalescer.enqueue(["a"]).expect("Caller A should queue.");
	let first_id = caller_a.interaction_id();

	assert_eq!(caller_a.wait().await.expect("Round 1 should succeed.").expose(), "round-1:a");

	time::sleep(Duration::from_millis(10)).await;

	let caller_b = coalescer.enqueue(["a"]).expect("Caller B should queue.");

	assert_ne!(caller_b.interaction_id(), first_id);
	assert!(!caller_b.is_settled());
	assert_eq!(caller_b.wait().await.expect("Round 2 should succeed.").expose(), "round-2:a");
	assert_eq!(fetcher.round_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn identical_pending_requests_share_one_deferred() {
	let fetcher = Arc::new(ScriptedInteractive::new());
	let coalescer = coalescer(&fetcher);
	let first = coalescer.enqueue(["Files.Read", "user.read"]).expect("First call should queue.");
	let second = coalescer.enqueue(["files.read", "User.Read"]).expect("Second call should queue.");

	assert!(first.shares_interaction_with(&second));
	assert_eq!(coalescer.pending_interactions(), 1);
	assert_eq!(coalescer.pending_scopes(), scopes(&["files.read", "user.read"]));

	let first = first.wait().await.expect("Round should succeed.");
	let second = second.wait().await.expect("Round should succeed.");

	assert_eq!(first, second);
	assert_eq!(fetcher.round_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn redirected_rounds_reject_waiters() {
	let fetcher = Arc::new(ScriptedInteractive::new().redirecting());
	let coalescer = coalescer(&fetcher);
	let result = coalescer.acquire_interactive(["mail.send"]).await;

	assert!(matches!(result, Err(Error::InteractionRedirected)), "{result:?}");
	assert_eq!(fetcher.round_count(), 1);
	assert!(!coalescer.is_interaction_in_flight());
}

#[tokio::test(start_paused = true)]
async fn steady_new_scopes_delay_the_round_without_a_cap() {
	let fetcher = Arc::new(ScriptedInteractive::new());
	let coalescer = coalescer(&fetcher);
	let first = coalescer.enqueue(["scope-0"]).expect("Request should queue.");

	for index in 1..10 {
		time::sleep(Duration::from_millis(150)).await;

		assert_eq!(fetcher.round_count(), 0);

		coalescer.enqueue([format!("scope-{index}")]).expect("Request should queue.");
	}

	first.wait().await.expect("Round should succeed once the stream stops.");

	assert_eq!(fetcher.round_count(), 1);
	assert_eq!(fetcher.rounds()[0].len(), 10);
}

#[tokio::test(start_paused = true)]
async fn max_delay_forces_a_round_under_steady_load() {
	let fetcher = Arc::new(ScriptedInteractive::new());
	let coalescer = InteractionCoalescer::new(fetcher.clone(), CoalescerOptions {
		max_delay: Some(Duration::from_millis(500)),
		..CoalescerOptions::default()
	});
	let started = Instant::now();
	let first = coalescer.enqueue(["scope-0"]).expect("Request should queue.");

	for index in 1..10 {
		time::sleep(Duration::from_millis(150)).await;
		coalescer.enqueue([format!("scope-{index}")]).expect("Request should queue.");
	}

	first.wait().await.expect("Capped round should succeed.");

	assert!(fetcher.round_count() >= 2, "{:?}", fetcher.rounds());
	assert_eq!(fetcher.rounds()[0], scopes(&["scope-0", "scope-1", "scope-2", "scope-3"]));
	assert!(started.elapsed() >= Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn login_hint_is_forwarded_with_each_round() {
	let fetcher = Arc::new(ScriptedInteractive::new());
	let coalescer = InteractionCoalescer::new(fetcher.clone(), CoalescerOptions {
		login_hint: Some(common::ACCOUNT.into()),
		..CoalescerOptions::default()
	});

	coalescer.acquire_interactive(["user.read"]).await.expect("Round should succeed.");

	coalescer.acquire_interactive(["mail.read"]).await.expect("Second round should succeed.");

	assert_eq!(fetcher.login_hints(), vec![
		Some(common::ACCOUNT.to_owned()),
		Some(common::ACCOUNT.to_owned())
	]);
}

#[tokio::test(start_paused = true)]
async fn rounds_without_a_hint_forward_none() {
	let fetcher = Arc::new(ScriptedInteractive::new());

	coalescer(&fetcher).acquire_interactive(["user.read"]).await.expect("Round should succeed.");

	assert_eq!(fetcher.login_hints(), vec![None]);
}

#[tokio::test(start_paused = true)]
async fn scopes_queued_behind_a_panicked_round_get_their_own_round() {
	let fetcher = Arc::new(ScriptedInteractive::new().with_delay(Duration::from_secs(1)));
	let coalescer = coalescer(&fetcher);

	fetcher.panic_next();

	let first = coalescer.enqueue(["a"]).expect("First request should queue.");

	time::sleep(Duration::from_millis(300)).await;

	let second = coalescer.enqueue(["b"]).expect("Second request should queue.");

	// The window for `b` closes while the first round is still running.
	time::sleep(Duration::from_millis(500)).await;

	assert!(coalescer.is_interaction_in_flight());
	assert_eq!(coalescer.pending_scopes(), scopes(&["b"]));

	assert!(matches!(first.wait().await, Err(Error::InteractionAbandoned)));

	let joiner = coalescer.enqueue(["b"]).expect("Joining request should queue.");

	assert!(joiner.shares_interaction_with(&second));

	let token = time::timeout(Duration::from_secs(60), second.wait())
		.await
		.expect("Queued scopes should not stay pending.")
		.expect("Follow-up round should succeed.");
	let joined = time::timeout(Duration::from_secs(60), joiner.wait())
		.await
		.expect("Joiner should not stay pending.")
		.expect("Joiner should share the follow-up round.");

	assert_eq!(token.expose(), "round-2:b");
	assert_eq!(joined, token);
	assert_eq!(fetcher.rounds(), vec![scopes(&["a"]), scopes(&["b"])]);
	assert!(!coalescer.is_interaction_in_flight());
	assert!(coalescer.pending_scopes().is_empty());
}
