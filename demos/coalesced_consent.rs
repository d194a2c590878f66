//! Demonstrates three dashboard widgets that all need fresh consent at once: their silent
//! refresh-token calls fail with `consent_required`, and the provider folds them into a
//! single interactive round.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use graph_auth_broker::{
	auth::{AccessToken, ClientId},
	config::{BrokerConfig, LoginType},
	error::AuthError,
	fetch::{
		AuthResponse, FetchFuture, InteractionRequest, InteractiveOutcome,
		InteractiveTokenFetcher, RefreshTokenFetcher,
	},
	provider::TokenProvider,
	reqwest::Client,
};

/// Stands in for a consent popup by printing the scopes it would ask for.
struct ConsolePopup;
impl InteractiveTokenFetcher for ConsolePopup {
	fn fetch_interactive<'a>(
		&'a self,
		request: &'a InteractionRequest,
	) -> FetchFuture<'a, InteractiveOutcome> {
		Box::pin(async move {
			println!("Opening one consent popup for: {}.", request.scopes);

			Ok::<_, AuthError>(InteractiveOutcome::Completed(
				AuthResponse::new(AccessToken::new("demo-consented-access"))
					.with_account("adele@contoso.test"),
			))
		})
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/common/oauth2/v2.0/token");
			then.status(400).header("content-type", "application/json").body(
				"{\"error\":\"invalid_grant\",\"suberror\":\"consent_required\",\"error_description\":\"AADSTS65001: consent missing\"}",
			);
		})
		.await;
	let config = BrokerConfig::builder(ClientId::new("demo-client")?)
		.login_type(LoginType::Popup)
		.interaction_debounce(Duration::from_millis(150))
		.build()?;
	let silent = RefreshTokenFetcher::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
		config.client_id.clone(),
		Url::parse(&server.url("/common/oauth2/v2.0/token"))?,
	)
	.with_refresh_token("demo-refresh");
	let provider = Arc::new(TokenProvider::new(config, Arc::new(silent), Arc::new(ConsolePopup)));
	let widgets = [
		("mail", vec!["Mail.Read"]),
		("agenda", vec!["Calendars.Read", "Mail.Read"]),
		("people", vec!["People.Read"]),
	];
	let mut tasks = Vec::new();

	for (widget, scopes) in widgets {
		let provider = provider.clone();

		tasks.push(tokio::spawn(async move {
			provider.get_access_token_for(scopes).await.map(|token| (widget, token))
		}));
	}

	for task in tasks {
		let (widget, token) = task.await??;

		println!("Widget {widget} received {token}.");
	}

	println!("Interactive rounds issued: {}.", provider.coalescer().metrics().rounds());

	token_mock.assert_calls_async(3).await;

	Ok(())
}
