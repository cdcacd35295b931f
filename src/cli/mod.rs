use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Question-specific context retrieval over a large knowledge base.
#[derive(Parser)]
#[command(name = "kbcontext")]
#[command(about = "Resolve questions into KB items and a relevant fact subgraph")]
#[command(version)]
pub struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the on-disk index files
    #[arg(long, global = true)]
    pub index_dir: Option<PathBuf>,

    /// Word/entity vectors file (word2vec text format)
    #[arg(long, global = true)]
    pub vectors: Option<PathBuf>,

    /// Stop-word list, one word per line
    #[arg(long, global = true)]
    pub stopwords: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct NeighborhoodArgs {
    /// KB item id (Q…/P…) or literal
    pub item: String,

    /// Neighborhood pruning threshold (0 disables pruning)
    #[arg(long, default_value_t = 1000)]
    pub p: usize,

    /// Attach labels to every fact element
    #[arg(long)]
    pub labels: bool,

    /// Attach the most frequent type as well (implies --labels)
    #[arg(long)]
    pub types: bool,
}

#[derive(Args)]
pub struct QueryArgs {
    /// The natural-language question
    pub question: String,

    /// Items kept per question word: a number, or AUTO
    #[arg(short, long)]
    pub k: Option<String>,

    /// Candidate-list depth per question word
    #[arg(short, long)]
    pub d: Option<usize>,

    /// Neighborhood pruning threshold for the search space
    #[arg(short, long)]
    pub p: Option<usize>,

    /// Attach labels to the tuple and the search-space facts
    #[arg(long)]
    pub labels: bool,

    /// Attach types as well (implies --labels)
    #[arg(long)]
    pub types: bool,

    /// Give up after this many milliseconds and return a partial result
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the display label of an item
    Label { item: String },

    /// Print all labels of an item
    Labels { item: String },

    /// Print the aliases of an item
    Aliases { item: String },

    /// Print the description of an item
    Description { item: String },

    /// Print the types of an item
    Types { item: String },

    /// Print [subject frequency, object frequency] of an item
    Frequency { item: String },

    /// Print the 1-hop neighborhood of an item
    Neighborhood(NeighborhoodArgs),

    /// Print the 2-hop neighborhood of an item
    TwoHop(NeighborhoodArgs),

    /// Print all 1-hop/2-hop paths between two items
    Connect { item1: String, item2: String },

    /// Print the connectivity score of two items (1, 0.5 or 0)
    Connectivity { item1: String, item2: String },

    /// Print the exact graph distance between two items (slow path)
    Distance { item1: String, item2: String },

    /// Print the facts around an explicit item tuple
    SearchSpace {
        /// KB item ids forming the tuple
        items: Vec<String>,

        /// Neighborhood pruning threshold
        #[arg(long, default_value_t = 1000)]
        p: usize,

        /// Attach labels to every fact element
        #[arg(long)]
        labels: bool,

        /// Attach types as well (implies --labels)
        #[arg(long)]
        types: bool,

        /// Keep only facts touching at least two tuple items
        #[arg(long)]
        connected: bool,
    },

    /// Resolve a question into its KB context
    Query(QueryArgs),

    /// Encode a raw dump into the on-disk index file set
    BuildIndex {
        /// Dump CSV: subject,predicate,object[,qualifier-pred,qualifier-obj]*
        #[arg(long)]
        dump: PathBuf,

        /// Output directory for the index files
        #[arg(long)]
        out: PathBuf,

        /// Optional JSON sidecar with labels/aliases/descriptions
        #[arg(long)]
        metadata: Option<PathBuf>,
    },
}
