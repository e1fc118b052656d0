use std::sync::Arc;

use anyhow::bail;
use clap::Parser;
use inquire::error::InquireResult;
use serde::Serialize;

mod app;
mod auth;
mod categories;
mod classifier;
mod cli;
mod config;
mod counters;
mod eid;
mod links;
mod llm;
mod metadata;
mod normalize;
mod providers;
mod semantic;
mod side_effects;
mod storage;
mod store;
#[cfg(test)]
mod tests;
mod web;

use app::AppFactory;
use cli::{CategoryArgs, Command};
use links::{ListOptions, SortOrder};

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    init_logging();

    let paths = AppFactory::get_paths()?;
    let config = AppFactory::create_config(&paths)?;

    let store = AppFactory::create_store(&paths)?;
    let app = AppFactory::create_app(&config, store)?;

    match args.command {
        Command::Daemon {} => {
            let verifier = Arc::new(AppFactory::create_verifier(&config));
            web::start_daemon(Arc::new(app), verifier, &config.listen_addr)
        }

        Command::Add { url, user } => {
            let created = app.create_link(&user.user, &url)?;
            if !created.created {
                log::info!("already saved");
            }
            print_json(&created.link)
        }

        Command::Links {
            category,
            inbox,
            asc,
            limit,
            cursor,
            user,
        } => {
            let opts = ListOptions {
                category_id: category,
                inbox,
                sort: if asc { SortOrder::Asc } else { SortOrder::Desc },
                limit,
                cursor,
            };
            print_json(&app.list_links(&user.user, opts)?)
        }

        Command::Get { id, user } => print_json(&app.get_link(&user.user, &id)?),

        Command::Move { id, category, user } => {
            print_json(&app.move_category(&user.user, &id, category.as_deref())?)
        }

        Command::Search {
            query,
            limit,
            cursor,
            user,
        } => print_json(&app.search_links(&user.user, &query, limit, cursor.as_deref())?),

        Command::Category { action } => match action {
            CategoryArgs::Add {
                name,
                description,
                user,
            } => print_json(&app.create_category(&user.user, &name, description)?),

            CategoryArgs::List { user } => print_json(&app.list_categories(&user.user)?),

            CategoryArgs::Delete { id, yes, user } => {
                if !yes {
                    match inquire::prompt_confirmation(format!(
                        "Delete category {id} and move its links to the inbox?"
                    )) {
                        InquireResult::Ok(true) => {}
                        InquireResult::Ok(false) => return Ok(()),
                        InquireResult::Err(err) => bail!("An error occurred: {}", err),
                    }
                }

                let moved = app.delete_category(&user.user, &id)?;
                println!("{moved} links moved to inbox");
                Ok(())
            }
        },

        Command::Reconcile { user } => match user {
            Some(uid) => print_json(&app.reconcile(&uid)?),
            None => {
                let reports = app.reconcile_all()?;
                if reports.is_empty() {
                    println!("no users yet");
                }
                for (uid, report) in reports {
                    println!("{uid}: {}", serde_json::to_string(&report)?);
                }
                Ok(())
            }
        },

        Command::Backfill { limit, user } => {
            print_json(&app.backfill_categories(&user.user, limit)?)
        }

        Command::Meta { url } => print_json(&app.fetcher().fetch(&normalize::normalize_url(&url))),
    }
}
