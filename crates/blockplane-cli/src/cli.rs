use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "blockplane",
    about = "Management plane for multipath iSCSI block storage on a shared volume",
    version
)]
pub struct Cli {
    /// Daemon to send operator commands to.
    #[arg(
        long,
        env = "BLOCKPLANE_URL",
        global = true,
        default_value = "http://127.0.0.1:24177"
    )]
    pub server: String,

    /// Ask for JSON responses instead of plain text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the blockplane daemon on this node.
    Serve {
        /// Path to the YAML config file; defaults apply when absent.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create a block and export it from the given hosts.
    Create {
        volume: String,
        block: String,

        /// Comma-separated candidate hosts, in spare-selection order.
        #[arg(long)]
        hosts: String,

        /// Number of hosts that must export the block simultaneously.
        #[arg(long, default_value_t = 1)]
        mpath: u32,

        /// Size of the backing file, e.g. "1GiB" or a byte count.
        #[arg(long)]
        size: String,

        /// Enable CHAP authentication on the target.
        #[arg(long)]
        auth: bool,

        /// Fully allocate the backing file up front.
        #[arg(long)]
        prealloc: bool,
    },

    /// Tear a block down on every node and remove it.
    Delete {
        volume: String,
        block: String,

        /// Keep the backing file; only the target configuration goes.
        #[arg(long)]
        keep_backing: bool,

        /// Skip the reachability pre-check and mask remote failures.
        #[arg(long)]
        force: bool,
    },

    /// Toggle CHAP authentication on an existing block.
    Modify {
        volume: String,
        block: String,

        /// "--auth true" enforces, "--auth false" clears.
        #[arg(long, action = ArgAction::Set)]
        auth: bool,
    },

    /// Migrate a block's export from one node to another.
    Replace {
        volume: String,
        block: String,
        old_node: String,
        new_node: String,

        /// Proceed even if the old node is gone for good.
        #[arg(long)]
        force: bool,
    },

    /// List the blocks of a volume.
    List { volume: String },

    /// Show one block's metadata.
    Info { volume: String, block: String },
}
