//! TechSpace CLI - a command-line client for the TechSpace API.
//!
//! Signs in, keeps the session fresh, and issues authenticated requests
//! against arbitrary API paths.

use std::io::{self, Write};

use anyhow::{Context, Result};
use futures::future::join_all;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use techspace_core::{
    ApiClient, CallError, Config, Operation, RawResponse, SessionController, SessionEvent,
};

/// Log file name inside the cache directory
const LOG_FILE: &str = "techspace.log";

const USAGE: &str = "\
Usage: techspace <command> [args]

Commands:
  login [email]                          Sign in (prompts for password)
  register <email> <display> <username>  Create an account (prompts for password)
  logout                                 Forget the stored session
  whoami                                 Show the signed-in user
  refresh                                Renew credentials now
  get <path>                             GET an API path
  delete <path>                          DELETE an API path
  post <path> <json>                     POST a JSON body
  put <path> <json>                      PUT a JSON body
  burst <path> [count]                   Issue concurrent GETs (default 5)
  watch                                  Keep the session fresh, printing session events

Set RUST_LOG (e.g. RUST_LOG=debug) to control logging.";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr and, when the cache directory is available, to a
/// daily-rolled file.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match Config::cache_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let mut config = Config::load().context("Failed to load config")?;
    let (controller, client) = SessionController::from_config(&config)?;
    info!(command, base_url = client.base_url(), "TechSpace CLI starting");

    let mut events = controller.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if event == SessionEvent::Terminated {
                eprintln!("Session expired - run `techspace login` to sign in again.");
            }
        }
    });

    let rest = &args[1..];
    match command {
        "login" => login(&controller, &client, &mut config, rest.first().cloned()).await,
        "register" => register(&controller, &client, &mut config, rest).await,
        "logout" => {
            controller.logout()?;
            println!("Signed out.");
            Ok(())
        }
        "whoami" => whoami(&controller).await,
        "refresh" => {
            report(controller.refresh_now().await)?;
            println!("Credentials renewed.");
            Ok(())
        }
        "get" => {
            let path = required(rest, 0, "path")?;
            print_response(report(controller.call(Operation::get(path)).await)?)
        }
        "delete" => {
            let path = required(rest, 0, "path")?;
            print_response(report(controller.call(Operation::delete(path)).await)?)
        }
        "post" | "put" => {
            let path = required(rest, 0, "path")?;
            let body: serde_json::Value = serde_json::from_str(required(rest, 1, "json")?)
                .context("Request body is not valid JSON")?;
            let op = if command == "post" {
                Operation::post(path)
            } else {
                Operation::put(path)
            };
            print_response(report(controller.call(op.json_value(body)).await)?)
        }
        "burst" => {
            let path = required(rest, 0, "path")?;
            let count = match rest.get(1) {
                Some(n) => n.parse().context("count must be a number")?,
                None => 5,
            };
            burst(&controller, path, count).await
        }
        "watch" => watch(&controller, &config).await,
        _ => {
            eprintln!("{}", USAGE);
            Err(anyhow::anyhow!("Unknown command: {}", command))
        }
    }
}

fn required<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("Missing argument: <{}>", name))
}

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Turn an unauthenticated result into a hint to sign in.
fn report<T>(result: Result<T, CallError>) -> Result<T> {
    result.map_err(|e| match e {
        CallError::Unauthenticated => anyhow::anyhow!("Not signed in - run `techspace login`"),
        other => other.into(),
    })
}

fn print_response(response: RawResponse) -> Result<()> {
    match serde_json::from_str::<serde_json::Value>(&response.body) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{}", response.body),
    }
    Ok(())
}

async fn login(
    controller: &SessionController,
    client: &ApiClient,
    config: &mut Config,
    email: Option<String>,
) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email")?,
    };
    let password = rpassword::prompt_password(format!("Password for {}: ", email))?;

    let issued = client.login(&email, &password).await?;
    controller.sign_in(issued)?;

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    match controller.user() {
        Some(user) => println!("Signed in as {}.", user.label()),
        None => match controller.hydrate_user().await {
            Ok(user) => println!("Signed in as {}.", user.label()),
            Err(e) => {
                warn!(error = %e, "Failed to load profile");
                println!("Signed in.");
            }
        },
    }
    Ok(())
}

async fn register(
    controller: &SessionController,
    client: &ApiClient,
    config: &mut Config,
    args: &[String],
) -> Result<()> {
    let email = required(args, 0, "email")?;
    let display_name = required(args, 1, "display")?;
    let username = required(args, 2, "username")?;
    let password = rpassword::prompt_password("Choose a password: ")?;

    let issued = client
        .register(email, &password, display_name, username)
        .await?;
    controller.sign_in(issued)?;

    config.last_email = Some(email.to_string());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Account created. Signed in as {}.", username);
    Ok(())
}

async fn whoami(controller: &SessionController) -> Result<()> {
    let Some(session) = controller.session() else {
        println!("Not signed in.");
        return Ok(());
    };

    let user = match session.user.clone() {
        Some(user) => user,
        None => report(controller.hydrate_user().await)?,
    };
    println!("{} <{}>", user.label(), user.email.as_deref().unwrap_or("no email"));
    println!("uid: {}", user.uid);
    match controller.session() {
        Some(s) if s.is_expired() => println!("access credential expired, renews on next call"),
        Some(s) => {
            if let Some(minutes) = s.minutes_until_expiry() {
                println!("access credential expires in {} min", minutes);
            }
        }
        None => {}
    }
    Ok(())
}

/// Fire `count` concurrent GETs and summarize the outcome.
async fn burst(controller: &SessionController, path: &str, count: usize) -> Result<()> {
    let mut events = controller.subscribe();

    let results = join_all((0..count).map(|_| controller.call(Operation::get(path)))).await;

    let mut ok = 0;
    for (i, result) in results.into_iter().enumerate() {
        match result {
            Ok(resp) => {
                ok += 1;
                println!("#{}: {}", i, resp.status);
            }
            Err(e) => println!("#{}: {}", i, e),
        }
    }

    let mut renewals = 0;
    while let Ok(event) = events.try_recv() {
        if event == SessionEvent::Renewed {
            renewals += 1;
        }
    }
    println!("{}/{} succeeded, {} renewal(s)", ok, count, renewals);
    Ok(())
}

/// Renew on the configured interval until the session ends.
async fn watch(controller: &SessionController, config: &Config) -> Result<()> {
    if !controller.is_authenticated() {
        return Err(anyhow::anyhow!("Not signed in - run `techspace login`"));
    }
    let interval = config
        .periodic_refresh()
        .ok_or_else(|| anyhow::anyhow!("periodic_refresh_secs is 0 in the config"))?;

    let mut events = controller.subscribe();
    let task = controller.spawn_periodic_refresh(interval);
    println!("Renewing every {}s.", interval.as_secs());

    while let Ok(event) = events.recv().await {
        println!("{}", serde_json::to_string(&event)?);
        if matches!(event, SessionEvent::Terminated | SessionEvent::SignedOut) {
            break;
        }
    }
    task.abort();
    Ok(())
}
