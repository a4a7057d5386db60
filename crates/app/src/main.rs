use std::fmt;

use services::{AppConfig, AppServices, Clock, RankingRow};
use speak_core::model::{DrugId, Gender, ProfileForm, SignInForm, SignUpForm};
use tracing::debug;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArg { command: &'static str, name: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidDbUrl { raw: String },
    InvalidDrug { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArg { command, name } => write!(f, "{command} requires <{name}>"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidDrug { raw } => write!(f, "invalid drug name: {raw:?}"),
        }
    }
}

impl std::error::Error for ArgsError {}

#[derive(Debug)]
enum Command {
    Login { email: String, password: String },
    SignUp { username: String, email: String, password: String, gender: Gender },
    Logout,
    Profile { name: String, password: Option<String> },
    Learn(DrugId),
    Finish(DrugId),
    Unfinish(DrugId),
    Remove { drug: DrugId, from_finished: bool },
    Record { drug: DrugId, uri: String },
    Status,
    Ranking,
}

struct Args {
    db_url: String,
    command: Command,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  drugspeak [--db <sqlite_url>] <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  login <email> <password>");
    eprintln!("  signup <username> <email> <password> [male|female|other]");
    eprintln!("  logout");
    eprintln!("  profile <name> [new_password]");
    eprintln!("  learn <drug>            add to the learning list");
    eprintln!("  finish <drug>           mark as finished");
    eprintln!("  unfinish <drug>         move back to learning");
    eprintln!("  remove <drug> [--finished]");
    eprintln!("  record <drug> <uri>     save and score a pronunciation");
    eprintln!("  status");
    eprintln!("  ranking");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  DRUGSPEAK_DB_URL (default sqlite://drugspeak.sqlite3)");
    eprintln!("  DRUGSPEAK_API_URL, DRUGSPEAK_API_TIMEOUT_MS");
    eprintln!("  DRUGSPEAK_SYNC_DEBOUNCE_MS, DRUGSPEAK_EVAL_LATENCY_MS");
    eprintln!("  RUST_LOG (default info)");
}

fn next_arg(
    args: &mut impl Iterator<Item = String>,
    command: &'static str,
    name: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingArg { command, name })
}

fn drug_arg(
    args: &mut impl Iterator<Item = String>,
    command: &'static str,
) -> Result<DrugId, ArgsError> {
    let raw = next_arg(args, command, "drug")?;
    raw.parse().map_err(|_| ArgsError::InvalidDrug { raw })
}

impl Command {
    fn parse(name: &str, args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let command = match name {
            "login" => Self::Login {
                email: next_arg(args, "login", "email")?,
                password: next_arg(args, "login", "password")?,
            },
            "signup" => Self::SignUp {
                username: next_arg(args, "signup", "username")?,
                email: next_arg(args, "signup", "email")?,
                password: next_arg(args, "signup", "password")?,
                gender: args.next().map_or_else(Gender::default, |raw| Gender::parse(&raw)),
            },
            "logout" => Self::Logout,
            "profile" => Self::Profile {
                name: next_arg(args, "profile", "name")?,
                password: args.next(),
            },
            "learn" => Self::Learn(drug_arg(args, "learn")?),
            "finish" => Self::Finish(drug_arg(args, "finish")?),
            "unfinish" => Self::Unfinish(drug_arg(args, "unfinish")?),
            "remove" => {
                let drug = drug_arg(args, "remove")?;
                let from_finished = match args.next().as_deref() {
                    None => false,
                    Some("--finished") => true,
                    Some(other) => return Err(ArgsError::UnknownArg(other.to_owned())),
                };
                Self::Remove {
                    drug,
                    from_finished,
                }
            }
            "record" => Self::Record {
                drug: drug_arg(args, "record")?,
                uri: next_arg(args, "record", "uri")?,
            },
            "status" => Self::Status,
            "ranking" => Self::Ranking,
            other => return Err(ArgsError::UnknownCommand(other.to_owned())),
        };
        if let Some(extra) = args.next() {
            return Err(ArgsError::UnknownArg(extra));
        }
        Ok(command)
    }
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let mut db_url = std::env::var("DRUGSPEAK_DB_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map_or_else(|| "sqlite://drugspeak.sqlite3".into(), normalize_sqlite_url);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = args.next().ok_or(ArgsError::MissingValue { flag: "--db" })?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--help" | "-h" => return Ok(None),
                _ if arg.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                name => {
                    let command = Command::parse(name, &mut args)?;
                    return Ok(Some(Self { db_url, command }));
                }
            }
        }
        Ok(None)
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

//
// ─── COMMANDS ──────────────────────────────────────────────────────────────────
//

fn print_ranking(rows: &[RankingRow]) {
    println!("{:>4}  {:<20} {:>8} {:>9} {:>9}", "#", "user", "score", "learning", "finished");
    for row in rows {
        let marker = if row.is_current_user { " (you)" } else { "" };
        let record = &row.entry.record;
        println!(
            "{:>4}  {:<20} {:>8} {:>9} {:>9}{marker}",
            row.rank,
            row.entry.username(),
            record.total_score,
            record.current_learning,
            record.finished_learning,
        );
    }
}

fn print_status(app: &AppServices) {
    let auth = app.auth().status();
    let Some(session) = auth.session else {
        println!("not signed in");
        return;
    };
    let progress = app.progress();
    println!(
        "signed in as {} <{}> (id {})",
        session.user.username, session.user.email, session.user.id
    );
    let list = |title: &str, drugs: Vec<DrugId>| {
        println!("{title} ({}):", drugs.len());
        for drug in drugs {
            match progress.score(&drug) {
                Some(score) => println!("  {drug}  best {score}"),
                None => println!("  {drug}"),
            }
        }
    };
    list("learning", progress.learning_list());
    list("finished", progress.finished_list());
    let data = progress.study_data();
    println!("total score: {}", data.total_score);
}

async fn execute(app: &AppServices, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let progress = app.progress();
    let auth = app.auth();

    let needs_session = !matches!(
        command,
        Command::Login { .. } | Command::SignUp { .. } | Command::Ranking | Command::Status
    );
    if needs_session && auth.session().is_none() {
        return Err("not signed in; run `drugspeak login <email> <password>` first".into());
    }

    match command {
        Command::Login { email, password } => {
            let session = auth.sign_in(SignInForm { email, password }).await?;
            println!("welcome back, {}", session.user.username);
        }
        Command::SignUp {
            username,
            email,
            password,
            gender,
        } => {
            let session = auth
                .sign_up(SignUpForm {
                    username,
                    email,
                    password,
                    gender,
                })
                .await?;
            println!("account created for {}", session.user.username);
        }
        Command::Logout => {
            auth.logout().await;
            println!("signed out");
        }
        Command::Profile { name, password } => {
            let form = ProfileForm {
                name,
                confirm_password: password.clone().unwrap_or_default(),
                password: password.unwrap_or_default(),
            };
            let session = auth.update_profile(form).await?;
            println!("profile updated: {}", session.user.username);
        }
        Command::Learn(drug) => {
            let change = progress.add_to_learning(drug.clone()).await?;
            debug!(?change, "learn");
            println!("learning {drug}");
        }
        Command::Finish(drug) => {
            progress.mark_finished(drug.clone()).await?;
            println!("finished {drug}");
        }
        Command::Unfinish(drug) => {
            progress.move_to_learning(drug.clone()).await?;
            println!("back to learning {drug}");
        }
        Command::Remove {
            drug,
            from_finished,
        } => {
            progress.remove(drug.clone(), from_finished).await?;
            println!("removed {drug}");
        }
        Command::Record { drug, uri } => {
            let recordings = app.recordings();
            recordings.add(&drug, uri).await?;
            let index = recordings.list(&drug).await?.len().saturating_sub(1);
            let outcome = recordings.evaluate(&drug, index).await?;
            let note = if outcome.raised { " (new best)" } else { "" };
            println!("{drug}: scored {}, best {}{note}", outcome.score, outcome.best);
        }
        Command::Status => print_status(app),
        Command::Ranking => print_ranking(&app.ranking().leaderboard().await?),
    }

    // A short-lived process must not leave a debounced push behind.
    if progress.flush_pending_sync().await == Some(false) {
        eprintln!("warning: progress saved locally but not synced");
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let parsed = Args::parse(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    let Some(parsed) = parsed else {
        print_usage();
        return Ok(());
    };

    init_tracing();
    let config = AppConfig::from_env()?;

    prepare_sqlite_file(&parsed.db_url)?;
    let app = AppServices::new_sqlite(&parsed.db_url, &config, Clock::System).await?;
    app.auth().restore_session().await?;

    execute(&app, parsed.command).await
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Option<Args>, ArgsError> {
        Args::parse(args.iter().map(|s| (*s).to_owned()))
    }

    #[test]
    fn parses_db_flag_and_command() {
        let args = parse(&["--db", "sqlite::memory:", "remove", "Aspirin", "--finished"])
            .unwrap()
            .unwrap();
        assert_eq!(args.db_url, "sqlite::memory:");
        assert!(matches!(
            args.command,
            Command::Remove {
                from_finished: true,
                ..
            }
        ));
    }

    #[test]
    fn signup_gender_is_optional() {
        let args = parse(&["signup", "kim", "k@x.io", "pw"]).unwrap().unwrap();
        assert!(matches!(
            args.command,
            Command::SignUp {
                gender: Gender::Male,
                ..
            }
        ));
        let args = parse(&["signup", "kim", "k@x.io", "pw", "Female"])
            .unwrap()
            .unwrap();
        assert!(matches!(
            args.command,
            Command::SignUp {
                gender: Gender::Female,
                ..
            }
        ));
    }

    #[test]
    fn rejects_missing_and_extra_args() {
        assert!(matches!(
            parse(&["record", "Aspirin"]),
            Err(ArgsError::MissingArg { name: "uri", .. })
        ));
        assert!(matches!(
            parse(&["status", "now"]),
            Err(ArgsError::UnknownArg(_))
        ));
        assert!(matches!(parse(&["dance"]), Err(ArgsError::UnknownCommand(_))));
        assert!(matches!(parse(&["learn", "  "]), Err(ArgsError::InvalidDrug { .. })));
    }

    #[test]
    fn no_command_prints_usage() {
        assert!(parse(&[]).unwrap().is_none());
        assert!(parse(&["--help"]).unwrap().is_none());
    }

    #[test]
    fn relative_db_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:data/app.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/app.sqlite3"));
    }
}
