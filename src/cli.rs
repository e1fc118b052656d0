use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct UserArgs {
    /// User id to act as
    #[clap(short, long, default_value = "local")]
    pub user: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CategoryArgs {
    /// Create a category
    Add {
        name: String,

        #[clap(short, long)]
        description: Option<String>,

        #[clap(flatten)]
        user: UserArgs,
    },
    /// List categories with their link counts, inbox first
    List {
        #[clap(flatten)]
        user: UserArgs,
    },
    /// Delete a category and move its links to the inbox
    Delete {
        id: String,

        /// Auto confirm
        #[clap(short, long, default_value = "false")]
        yes: bool,

        #[clap(flatten)]
        user: UserArgs,
    },
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the HTTP API
    Daemon {},

    /// Save a url
    Add {
        url: String,

        #[clap(flatten)]
        user: UserArgs,
    },

    /// List links, newest first
    Links {
        /// Only links of this category
        #[clap(short, long)]
        category: Option<String>,

        /// Only uncategorized links
        #[clap(long, default_value = "false")]
        inbox: bool,

        /// Oldest first
        #[clap(long, default_value = "false")]
        asc: bool,

        #[clap(short, long)]
        limit: Option<usize>,

        /// Id of the last link of the previous page
        #[clap(long)]
        cursor: Option<String>,

        #[clap(flatten)]
        user: UserArgs,
    },

    /// Show a single link
    Get {
        id: String,

        #[clap(flatten)]
        user: UserArgs,
    },

    /// Move a link to a category, or to the inbox when no category is given
    Move {
        id: String,

        #[clap(short, long)]
        category: Option<String>,

        #[clap(flatten)]
        user: UserArgs,
    },

    /// Find links by title prefix
    Search {
        query: String,

        #[clap(short, long)]
        limit: Option<usize>,

        #[clap(long)]
        cursor: Option<String>,

        #[clap(flatten)]
        user: UserArgs,
    },

    /// Manage categories
    Category {
        #[clap(subcommand)]
        action: CategoryArgs,
    },

    /// Fetch and print page metadata without saving anything
    Meta { url: String },

    /// Recompute link counters from a full scan
    Reconcile {
        /// Only this user; every user when omitted
        #[clap(short, long)]
        user: Option<String>,
    },

    /// Classify links that are still in the inbox
    Backfill {
        #[clap(short, long, default_value = "50")]
        limit: usize,

        #[clap(flatten)]
        user: UserArgs,
    },
}
