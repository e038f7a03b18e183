//! termbase: administration CLI for the terminology store.
//!
//! Reads configuration from `TERMBASE_CONFIG` / `~/.config/termbase/config.toml`
//! or the environment (`DATABASE_URL`, `TERMBASE_*`), after loading `.env`.
//! Without a database URL every command runs against a throwaway in-memory
//! store.

use std::process::ExitCode;

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use termbase_db::{
    log_pool_metrics, Concept, Database, HasNames, LocalizedText, Organization, ParentRef, Source,
    SourceType, SourceVersion, TermbaseConfig, User, UserProfile, ValidationErrors,
    VersionChanges,
};

#[derive(Parser)]
#[command(name = "termbase")]
#[command(author, version, about = "Versioned terminology store administration")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Manage users
    #[command(subcommand)]
    User(UserCommand),

    /// Manage organizations
    #[command(subcommand)]
    Org(OrgCommand),

    /// Manage sources
    #[command(subcommand)]
    Source(SourceCommand),

    /// Manage concepts
    #[command(subcommand)]
    Concept(ConceptCommand),
}

#[derive(Subcommand)]
enum UserCommand {
    /// Create a user with a profile and print its API token
    Create {
        #[arg(long)]
        username: String,

        #[arg(long)]
        email: String,

        #[arg(long)]
        full_name: Option<String>,
    },
}

#[derive(Subcommand)]
enum OrgCommand {
    /// Create an organization
    Create {
        #[arg(long)]
        mnemonic: String,

        #[arg(long)]
        name: String,
    },
}

/// Owner of a source: an organization or a user profile.
#[derive(Args)]
struct OwnerArgs {
    /// Organization mnemonic
    #[arg(long, conflicts_with = "user", required_unless_present = "user")]
    org: Option<String>,

    /// User profile mnemonic
    #[arg(long)]
    user: Option<String>,
}

/// A source addressed through its owner.
#[derive(Args)]
struct SourceArgs {
    #[command(flatten)]
    owner: OwnerArgs,

    /// Source mnemonic
    #[arg(long)]
    source: String,
}

#[derive(Subcommand)]
enum SourceCommand {
    /// Create a source with its initial released version
    Create {
        #[command(flatten)]
        owner: OwnerArgs,

        #[arg(long)]
        mnemonic: String,

        #[arg(long)]
        name: String,

        /// Username of the owning account
        #[arg(long)]
        created_by: String,

        #[arg(long)]
        full_name: Option<String>,

        /// dictionary, reference or externalDictionary
        #[arg(long, default_value = "dictionary")]
        source_type: String,
    },

    /// Release a new version seeded from the current one
    Release {
        #[command(flatten)]
        target: SourceArgs,

        /// Version mnemonic
        #[arg(long)]
        label: String,
    },
}

#[derive(Subcommand)]
enum ConceptCommand {
    /// Create a concept in a source
    Create {
        #[command(flatten)]
        target: SourceArgs,

        #[arg(long)]
        mnemonic: String,

        #[arg(long = "class")]
        concept_class: String,

        /// Preferred display name
        #[arg(long)]
        name: String,

        #[arg(long)]
        locale: Option<String>,

        /// Username of the creating account
        #[arg(long)]
        created_by: String,
    },

    /// Retire a concept
    Retire {
        #[command(flatten)]
        target: SourceArgs,

        #[arg(long)]
        mnemonic: String,
    },

    /// Print a concept as JSON
    Show {
        #[command(flatten)]
        target: SourceArgs,

        #[arg(long)]
        mnemonic: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` filter (default `termbase=info,termbase_db=info`), `LOG_FORMAT`
/// "json" or "text". Logs go to stderr so command output stays parseable.
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "termbase=info,termbase_db=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = TermbaseConfig::load()?;
    config.validate()?;
    let db = Database::from_config(&config).await?;

    match cli.command {
        Commands::Migrate => {
            db.migrate().await?;
            if let Some(pool) = db.pool() {
                let stats = log_pool_metrics(pool);
                info!(
                    subsystem = "cli",
                    op = "migrate",
                    pool_size = stats.size,
                    "Migrations applied"
                );
            } else {
                info!(subsystem = "cli", op = "migrate", "Migrations applied");
            }
        }
        Commands::User(UserCommand::Create {
            username,
            email,
            full_name,
        }) => {
            let user = User::new(username.clone(), email);
            let token = db.users.create_user(&user).await?;
            let mut profile = UserProfile::new(user.id, username);
            profile.full_name = full_name;
            ensure_ok(db.users.create_profile(&mut profile).await)?;
            print_json(&json!({ "id": user.id, "username": user.username, "token": token.key }))?;
        }
        Commands::Org(OrgCommand::Create { mnemonic, name }) => {
            let mut org = Organization::new(mnemonic, name);
            ensure_ok(db.organizations.persist_new(&mut org).await)?;
            print_json(&json!({ "id": org.id, "url": db.organizations.url(&org) }))?;
        }
        Commands::Source(command) => run_source(&db, &config, command).await?,
        Commands::Concept(command) => run_concept(&db, command).await?,
    }
    Ok(())
}

async fn run_source(db: &Database, config: &TermbaseConfig, command: SourceCommand) -> anyhow::Result<()> {
    match command {
        SourceCommand::Create {
            owner,
            mnemonic,
            name,
            created_by,
            full_name,
            source_type,
        } => {
            let parent = resolve_owner(db, &owner).await?;
            let user = find_user(db, &created_by).await?;
            let mut source = Source::new(mnemonic, name);
            source.full_name = full_name;
            source.source_type = source_type.parse::<SourceType>()?;
            source.default_locale = config.default_locale.clone();
            ensure_ok(db.sources.persist_new(&mut source, Some(&user), Some(parent)).await)?;
            print_json(&json!({ "id": source.id, "url": db.sources.url(&source).await? }))?;
        }
        SourceCommand::Release { target, label } => {
            let source = resolve_source(db, &target).await?;
            let current = db.sources.latest_version(&source).await?;
            let mut version =
                SourceVersion::for_base_object(&source, &label, current.as_ref(), None, true);
            ensure_ok(
                db.source_versions
                    .persist_new(&mut version, VersionChanges::default())
                    .await,
            )?;
            print_json(&json!({
                "id": version.id,
                "mnemonic": version.mnemonic,
                "previous_version": db.source_versions.previous_version_mnemonic(&version).await?,
                "concepts": version.concepts.len(),
                "url": db.source_versions.url(&version).await?,
            }))?;
        }
    }
    Ok(())
}

async fn run_concept(db: &Database, command: ConceptCommand) -> anyhow::Result<()> {
    match command {
        ConceptCommand::Create {
            target,
            mnemonic,
            concept_class,
            name,
            locale,
            created_by,
        } => {
            let source = resolve_source(db, &target).await?;
            let user = find_user(db, &created_by).await?;
            let locale = locale.unwrap_or_else(|| source.default_locale.clone());
            let mut concept = Concept::new(mnemonic, concept_class);
            concept.names.push(LocalizedText::new(name, locale).preferred());
            ensure_ok(
                db.concepts
                    .persist_new(&mut concept, Some(&user), Some(&source), None)
                    .await,
            )?;
            print_json(&json!({ "id": concept.id, "url": db.concepts.url(&concept).await? }))?;
        }
        ConceptCommand::Retire { target, mnemonic } => {
            let mut concept = resolve_concept(db, &target, &mnemonic).await?;
            if !db.concepts.retire(&mut concept).await? {
                bail!("concept {} is already retired", mnemonic);
            }
            print_json(&json!({ "id": concept.id, "retired": true }))?;
        }
        ConceptCommand::Show { target, mnemonic } => {
            let concept = resolve_concept(db, &target, &mnemonic).await?;
            let latest = db.concepts.latest_version(&concept).await?;
            print_json(&json!({
                "id": concept.id,
                "mnemonic": concept.mnemonic,
                "concept_class": concept.concept_class,
                "display_name": concept.display_name(),
                "display_locale": concept.display_locale(),
                "retired": concept.retired,
                "owner": db.concepts.owner_name(&concept).await?,
                "owner_type": db.concepts.owner_type(&concept).await?,
                "source": db.concepts.parent_resource(&concept).await?,
                "num_versions": db.concepts.num_versions(&concept).await?,
                "latest_version": latest.map(|v| v.mnemonic),
                "url": db.concepts.url(&concept).await?,
            }))?;
        }
    }
    Ok(())
}

fn ensure_ok(errors: ValidationErrors) -> anyhow::Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("{}", errors))
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn find_user(db: &Database, username: &str) -> anyhow::Result<User> {
    db.users
        .get_by_username(username)
        .await?
        .with_context(|| format!("no user named {}", username))
}

async fn resolve_owner(db: &Database, owner: &OwnerArgs) -> anyhow::Result<ParentRef> {
    match (&owner.org, &owner.user) {
        (Some(org), _) => {
            let org = db
                .organizations
                .get_by_mnemonic(org)
                .await?
                .with_context(|| format!("no organization {}", org))?;
            Ok(ParentRef::Organization(org.id))
        }
        (None, Some(user)) => {
            let profile = db
                .users
                .profile_by_mnemonic(user)
                .await?
                .with_context(|| format!("no user profile {}", user))?;
            Ok(ParentRef::UserProfile(profile.id))
        }
        (None, None) => bail!("either --org or --user is required"),
    }
}

async fn resolve_source(db: &Database, target: &SourceArgs) -> anyhow::Result<Source> {
    let parent = resolve_owner(db, &target.owner).await?;
    db.sources
        .get_by_mnemonic(&parent, &target.source)
        .await?
        .with_context(|| format!("no source {} under {}", target.source, parent))
}

async fn resolve_concept(db: &Database, target: &SourceArgs, mnemonic: &str) -> anyhow::Result<Concept> {
    let source = resolve_source(db, target).await?;
    db.concepts
        .get_by_mnemonic(source.id, mnemonic)
        .await?
        .with_context(|| format!("no concept {} in source {}", mnemonic, source.mnemonic))
}
