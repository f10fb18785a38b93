use super::*;

#[test]
fn parses_get_with_state_dir() {
    let cli = Cli::try_parse_from(["snapgram", "--state-dir", "/tmp/snapgram", "get", "/posts"]).expect("parse");
    assert_eq!(cli.state_dir, Some(PathBuf::from("/tmp/snapgram")));
    assert!(matches!(cli.command, Command::Get { ref path } if path == "/posts"));
}

#[test]
fn parses_signin_flags() {
    let cli = Cli::try_parse_from(["snapgram", "signin", "--credential", "alice", "--password", "pw", "--remember"])
        .expect("parse");
    let Command::Signin(args) = cli.command else { panic!("expected signin") };
    assert_eq!(args.credential, "alice");
    assert!(args.remember);
}

#[test]
fn build_context_trims_api_url_override() {
    let cli = Cli::try_parse_from([
        "snapgram",
        "--api-url",
        "https://api.example.test/",
        "--state-dir",
        "/tmp/snapgram",
        "whoami",
    ])
    .expect("parse");
    let ctx = build_context(&cli).expect("context");
    assert_eq!(ctx.config.api_base_url, "https://api.example.test");
    assert_eq!(ctx.store.dir(), std::path::Path::new("/tmp/snapgram"));
}

#[test]
fn signed_out_prefers_redirect_reason() {
    let outcome = Outcome::Redirect(session::Redirect {
        to: "/signin".to_owned(),
        reason: Some(session::SessionError::MissingRequiredClaim("id")),
    });
    let err = signed_out(&outcome, "fallback");
    let message = err.to_string();
    assert!(message.contains("missing required claim `id`"), "{message}");
    assert!(message.contains("/signin"));
}

#[test]
fn signed_out_uses_fallback_for_logout_redirect() {
    let outcome = Outcome::Redirect(session::Redirect { to: "/signin".to_owned(), reason: None });
    assert!(signed_out(&outcome, "backend rejected the stored token").to_string().contains("backend rejected"));
}

#[test]
fn whoami_without_token_is_signed_out() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = CliContext {
        config: SessionConfig::default(),
        store: FileStore::new(dir.path()),
        http: reqwest::Client::new(),
    };
    let err = run_whoami(&ctx).expect_err("no token");
    assert!(matches!(err, CliError::SignedOut { .. }));
}
