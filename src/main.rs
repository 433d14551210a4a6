// Command-line shell for poking at larch database files.
//
// There is no catalog layer, so tree roots are passed explicitly; a
// fresh database has a table tree rooted at page 1.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use larch::{BTree, PageType};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database file (created on first use)
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print file-level information
    Info,
    /// Insert a row into a table tree
    Put {
        key: u32,
        value: String,
        /// Root page of the table tree
        #[arg(long, default_value_t = 1)]
        root: u32,
    },
    /// Look a row up by key
    Get {
        key: u32,
        /// Root page of the table tree
        #[arg(long, default_value_t = 1)]
        root: u32,
    },
    /// Allocate an empty index tree, printing its root page
    NewIndex,
    /// Insert an entry into an index tree
    IndexPut {
        /// Root page of the index tree
        root: u32,
        key_idx: u32,
        key_pk: u32,
    },
    /// Look a row up through an index tree
    IndexGet {
        /// Root page of the index tree
        root: u32,
        key_idx: u32,
        /// Root page of the table tree the index points into
        #[arg(long, default_value_t = 1)]
        table_root: u32,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> larch::Result<()> {
    let mut bt = BTree::open(&cli.db)?;

    match cli.command {
        Command::Info => {
            println!("page size: {}", bt.page_size());
            println!("pages:     {}", bt.n_pages());
            let root = bt.load_node(1)?;
            println!(
                "page 1:    {:?} with {} cell(s)",
                root.page_type, root.n_cells
            );
            bt.free_node(root);
        }
        Command::Put { key, value, root } => {
            bt.insert_in_table(root, key, value.as_bytes())?;
        }
        Command::Get { key, root } => {
            let data = bt.find(root, key)?;
            println!("{}", String::from_utf8_lossy(&data));
        }
        Command::NewIndex => {
            let npage = bt.new_node(PageType::IndexLeaf)?;
            println!("{npage}");
        }
        Command::IndexPut {
            root,
            key_idx,
            key_pk,
        } => {
            bt.insert_in_index(root, key_idx, key_pk)?;
        }
        Command::IndexGet {
            root,
            key_idx,
            table_root,
        } => {
            let data = bt.find_via_index(root, table_root, key_idx)?;
            println!("{}", String::from_utf8_lossy(&data));
        }
    }

    bt.close()
}
