//!
//! commentboard CLI binary
//! -----------------------
//! Interactive terminal client view against a running commentboard server. Login
//! goes through an in-process identity provider that signs sessions with the
//! server's shared secret, so the server's session check accepts them.

use std::env;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use reqwest::Url;

use commentboard::client::{ClientView, HttpCommentsApi, SubmitMode, SubmitOutcome, ViewOptions};
use commentboard::identity::{IdentityProvider, LocalIdentityProvider, SessionManager, TokenSigner};

const DEFAULT_SERVER: &str = "http://127.0.0.1:7979";
const DEFAULT_AUTH_URL: &str = "http://127.0.0.1:7979/auth/v1";

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--server <url>] [--auth-url <url>] [--refetch]\n\nFlags:\n  --server <url>      commentboard server (env: BOARD_SERVER_URL, default {DEFAULT_SERVER})\n  --auth-url <url>    Identity provider base URL (env: BOARD_AUTH_URL)\n  --refetch           Reload the list after each post instead of appending\n  -h, --help          Show this help\n\nEnvironment:\n  BOARD_SESSION_SECRET  Secret shared with the server for signing sessions\n\nInteractive commands:\n  login <email>       sign in (completes the OAuth round trip as <email>)\n  logout              sign out\n  post <text>         set the draft and submit it\n  submit              submit the current draft\n  show                reload and print the board\n  refresh-token       reissue the session token\n  help                show this help\n  quit | exit         leave\n  <text>              anything else becomes the draft"
    );
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let i = args.iter().position(|a| a == flag)?;
    args.get(i + 1).cloned()
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .try_init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().cloned().unwrap_or_else(|| "board_cli".to_string());
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage(&program);
        return Ok(());
    }

    let server = arg_value(&args, "--server")
        .or_else(|| env::var("BOARD_SERVER_URL").ok())
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());
    let auth_url = arg_value(&args, "--auth-url")
        .or_else(|| env::var("BOARD_AUTH_URL").ok())
        .unwrap_or_else(|| DEFAULT_AUTH_URL.to_string());
    let submit_mode = if args.iter().any(|a| a == "--refetch") { SubmitMode::Refetch } else { SubmitMode::Append };

    let signer = match env::var("BOARD_SESSION_SECRET") {
        Ok(secret) if !secret.is_empty() => TokenSigner::new(secret.into_bytes()),
        _ => {
            eprintln!("warning: BOARD_SESSION_SECRET not set; posts will be rejected by a server that verifies sessions");
            TokenSigner::generate().context("Failed to generate a session secret")?
        }
    };

    let api = HttpCommentsApi::new(&server).with_context(|| format!("invalid server URL '{}'", server))?;
    let auth_url = Url::parse(&auth_url).with_context(|| format!("invalid auth URL '{}'", auth_url))?;
    let provider = Arc::new(LocalIdentityProvider::new(SessionManager::new(signer), auth_url));

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    let mut options = ViewOptions::new(server.clone());
    options.submit_mode = submit_mode;
    let identity: Arc<dyn IdentityProvider> = provider.clone();
    let view = rt.block_on(ClientView::start(identity, Arc::new(api), options));

    println!("commentboard client for {}. Type 'help' for commands.", server);
    print!("{}", view.render());
    let result = run_repl(&rt, &view, &provider, &program);
    view.teardown();
    result
}

fn run_repl(rt: &tokio::runtime::Runtime, view: &ClientView, provider: &LocalIdentityProvider, program: &str) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut input = String::new();
    loop {
        input.clear();
        print!("> ");
        let _ = stdout.flush();
        match stdin.read_line(&mut input) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => return Err(anyhow!("failed to read input: {}", e)),
        }
        let line = input.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        let (cmd, rest) = match line.trim_start().split_once(' ') {
            Some((c, r)) => (c, r),
            None => (line.trim(), ""),
        };
        match cmd.to_ascii_lowercase().as_str() {
            "quit" | "exit" => break,
            "help" => print_usage(program),
            "login" => {
                if rt.block_on(view.login()).is_err() {
                    continue;
                }
                if let Some(url) = provider.pending_authorize_url() {
                    println!("authorize at {}", url);
                }
                match provider.complete_oauth(rest) {
                    Ok(_) => {
                        rt.block_on(view.process_events());
                        print!("{}", view.render());
                    }
                    Err(e) => eprintln!("error: {}", e),
                }
            }
            "logout" => {
                rt.block_on(view.sign_out());
                rt.block_on(view.process_events());
                print!("{}", view.render());
            }
            "post" => {
                view.set_draft(rest);
                report(rt.block_on(view.submit()));
                print!("{}", view.render());
            }
            "submit" => {
                report(rt.block_on(view.submit()));
                print!("{}", view.render());
            }
            "show" => {
                if let Err(e) = rt.block_on(view.reload()) {
                    eprintln!("error: {}", e);
                }
                print!("{}", view.render());
            }
            "refresh-token" => match provider.refresh_session() {
                Ok(s) => {
                    rt.block_on(view.process_events());
                    println!("session token renewed, expires {}", s.expires_at);
                }
                Err(e) => eprintln!("error: {}", e),
            },
            _ => {
                if view.is_logged_in() {
                    view.set_draft(line);
                } else {
                    eprintln!("not logged in; use 'login <email>'");
                }
            }
        }
    }
    Ok(())
}

fn report(outcome: SubmitOutcome) {
    match outcome {
        SubmitOutcome::Posted(c) => println!("posted {}", c.id),
        SubmitOutcome::EmptyDraft => println!("nothing to post"),
        SubmitOutcome::Busy => println!("a post is already in flight"),
        SubmitOutcome::NotLoggedIn => println!("not logged in; use 'login <email>'"),
        SubmitOutcome::Failed(e) => eprintln!("error: {}", e),
        SubmitOutcome::Discarded => println!("post finished after the session changed"),
    }
}
