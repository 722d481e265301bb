use crate::accounts::{Accounts, Registration};
use crate::cli::{Cli, Command, Credentials, LoadArgs};
use crate::config::{ImportConfig, SelfLoopPolicy, StoreConfig};
use crate::ingest::edge_list::EdgeListSource;
use crate::ingest::synthetic::{SyntheticConfig, write_dataset};
use crate::store::schema::{NODE_LABEL, RELATIONSHIP_TYPE};
use crate::store::{GraphStore, ProfileUpdate, UserSummary};
use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub mod accounts;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod social;
pub mod store;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn import_config(load: LoadArgs, self_loops: SelfLoopPolicy) -> ImportConfig {
    ImportConfig {
        data_dir: load.data_dir,
        batch_size: load.batch_size,
        self_loops,
    }
}

/// Opens the store with the schema declared, for the account and graph commands.
fn open_store(cfg: &StoreConfig) -> Result<GraphStore> {
    let store = cfg
        .open()
        .with_context(|| format!("opening {}", cfg.db_path.display()))?;
    store.apply_schema().context("declaring schema")?;
    Ok(store)
}

fn print_users(title: &str, users: &[UserSummary]) {
    println!("{title} ({}):", users.len());
    for user in users {
        println!(
            "  @{} {} - {}",
            user.username,
            user.name,
            user.bio.as_deref().unwrap_or("No bio")
        );
    }
}

fn login(store: &GraphStore, credentials: &Credentials) -> Result<()> {
    Accounts::new(store)
        .login(&credentials.username, &credentials.password)
        .context("login failed")?;
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let store_config = StoreConfig {
        db_path: cli.db,
        timeout: Duration::from_millis(cli.timeout_ms),
    };

    match cli.command {
        Command::Import {
            dataset,
            load,
            self_loops,
        } => {
            let config = import_config(load, self_loops);
            let report = pipeline::run_import(
                &store_config,
                &config,
                &EdgeListSource::new(&dataset),
            )
            .with_context(|| format!("importing {}", dataset.display()))?;
            println!(
                "events: {}, users: {}/{}, follows: {}/{} ({} observed pairs, {} self-loops dropped)",
                report.events,
                report.users_loaded,
                report.users,
                report.follows_loaded,
                report.staged_follows,
                report.observed_pairs,
                report.dropped_self_loops
            );
        }
        Command::LoadStaged { load } => {
            let config = import_config(load, SelfLoopPolicy::default());
            let (users, follows) = pipeline::run_staged_load(&store_config, &config)
                .with_context(|| format!("loading {}", config.data_dir.display()))?;
            println!("users: {users}, follows: {follows}");
        }
        Command::Schema => {
            let store = open_store(&store_config)?;
            for entry in store.schema_info()? {
                println!("{} {} on {}", entry.kind.as_str(), entry.name, entry.table);
            }
            println!("label: {NODE_LABEL}, relationship: {RELATIONSHIP_TYPE}");
        }
        Command::Stats => {
            let stats = open_store(&store_config)?.stats()?;
            println!(
                "users: {} ({} imported, {} registered), follows: {}",
                stats.users, stats.imported_users, stats.registered_users, stats.follows
            );
        }
        Command::Generate {
            out,
            users,
            events,
            seed,
        } => {
            let cfg = SyntheticConfig {
                user_count: users,
                event_count: events,
                seed,
                ..SyntheticConfig::default()
            };
            let written = write_dataset(&out, &cfg)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("wrote {written} events to {}", out.display());
        }
        Command::Register {
            credentials,
            email,
            name,
            bio,
            dataset_id,
        } => {
            let store = open_store(&store_config)?;
            let user = Accounts::new(&store).register(&Registration {
                username: &credentials.username,
                password: &credentials.password,
                email: &email,
                name: &name,
                bio: &bio,
                dataset_id: dataset_id.as_deref(),
            })?;
            println!("User '{}' registered successfully", user.username);
        }
        Command::Login { credentials } => {
            let store = open_store(&store_config)?;
            let user = Accounts::new(&store).login(&credentials.username, &credentials.password)?;
            println!("Welcome, {}!", user.name);
        }
        Command::Profile { credentials } => {
            let store = open_store(&store_config)?;
            login(&store, &credentials)?;
            let profile = Accounts::new(&store).view_profile(&credentials.username)?;
            println!("Username: {}", profile.user.username);
            println!("Name: {}", profile.user.name);
            println!("Email: {}", profile.user.email);
            println!(
                "Bio: {}",
                profile
                    .user
                    .bio
                    .as_deref()
                    .filter(|b| !b.is_empty())
                    .unwrap_or("No bio set")
            );
            if let Some(id) = &profile.user.user_id {
                println!("Dataset id: {id}");
            }
            println!("Created: {}", profile.user.created_at);
            println!("Following: {}", profile.following_count);
            println!("Followers: {}", profile.followers_count);
        }
        Command::EditProfile {
            credentials,
            name,
            bio,
            email,
        } => {
            let store = open_store(&store_config)?;
            login(&store, &credentials)?;
            let user = Accounts::new(&store)
                .edit_profile(&credentials.username, &ProfileUpdate { name, bio, email })?;
            println!("Profile updated successfully for '{}'", user.username);
        }
        Command::Follow {
            credentials,
            target,
        } => {
            let store = open_store(&store_config)?;
            login(&store, &credentials)?;
            social::follow(&store, &credentials.username, &target)?;
            println!("Successfully followed {target}");
        }
        Command::Unfollow {
            credentials,
            target,
        } => {
            let store = open_store(&store_config)?;
            login(&store, &credentials)?;
            social::unfollow(&store, &credentials.username, &target)?;
            println!("Successfully unfollowed {target}");
        }
        Command::Connections { username } => {
            let store = open_store(&store_config)?;
            let conns = social::connections(&store, &username)?;
            print_users("Following", &conns.following);
            print_users("Followers", &conns.followers);
        }
        Command::Mutual { first, second } => {
            let store = open_store(&store_config)?;
            print_users("Mutual", &social::mutual(&store, &first, &second)?);
        }
        Command::Search { term, exclude } => {
            let store = open_store(&store_config)?;
            print_users("Found", &social::search(&store, &term, exclude.as_deref())?);
        }
    }

    Ok(())
}
