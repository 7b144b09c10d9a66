//! idstore CLI - inspect archive files and create model files.

use std::env;
use std::path::Path;

use idstore::store::{format, Dataset, GroupNode, IStreams, Node};
use idstore::{Config, Engine};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = "info";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-q" | "--quiet" => level = "error",
            _ => filtered_args.push(arg),
        }
    }
    init_logging(level);

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    match filtered_args[0] {
        "info" | "i" => {
            let Some(path) = filtered_args.get(1) else {
                eprintln!("Error: missing file argument");
                eprintln!("Usage: idstore-cli info <file.hd5>");
                std::process::exit(1);
            };
            cmd_info(path);
        }

        "tree" | "t" => {
            let Some(path) = filtered_args.get(1) else {
                eprintln!("Error: missing file argument");
                eprintln!("Usage: idstore-cli tree <file.hd5> [--json]");
                std::process::exit(1);
            };
            let json_mode = filtered_args.iter().any(|&s| s == "--json" || s == "-j");
            cmd_tree(path, json_mode);
        }

        "model" | "m" => {
            if filtered_args.len() < 3 {
                eprintln!("Error: missing arguments");
                eprintln!("Usage: idstore-cli model <name> <ids_root>...");
                std::process::exit(1);
            }
            cmd_model(filtered_args[1], &filtered_args[2..]);
        }

        "version" | "--version" => {
            println!("idstore-cli {} (built {})", env!("CARGO_PKG_VERSION"), env!("IDSTORE_BUILD_DATE"));
        }

        "help" | "h" | "-h" | "--help" => print_help(),

        // Bare file path
        other if Path::new(other).is_file() => cmd_info(other),

        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!("idstore-cli - IDS archive toolkit");
    println!();
    println!("USAGE:");
    println!("    idstore-cli [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    i, info  <file>               Show archive header and node counts");
    println!("    t, tree  <file> [--json]      Show group/dataset hierarchy");
    println!("    m, model <name> <root>...     Create an empty model file");
    println!("    version                       Show version");
    println!("    h, help                       Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose    Show debug output");
    println!("    -q, --quiet      Only show errors");
    println!();
    println!("ENVIRONMENT:");
    println!("    HDF5_MODEL_BASE, IMAS_IDS_VERSION, IMAS_IDS_DEVICE select the model path");
    println!("    RUST_LOG overrides the log filter");
}

fn load(path: &str) -> (IStreams, GroupNode) {
    let streams = match IStreams::open(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open {}: {}", path, e);
            std::process::exit(1);
        }
    };
    match streams.load_tree() {
        Ok(tree) => (streams, tree),
        Err(e) => {
            eprintln!("Failed to read {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

fn cmd_info(path: &str) {
    info!("Opening archive: {}", path);
    let (streams, tree) = load(path);
    let (groups, datasets) = tree.count_nodes();
    debug!(groups, datasets, "counted nodes");

    println!("Archive: {}", path);
    println!("Version: {} (current {})", streams.version(), format::CURRENT_VERSION);
    println!("Size:    {} bytes", streams.size());
    println!("Frozen:  {}", streams.is_frozen());
    println!();
    println!("Groups:   {}", groups);
    println!("Datasets: {}", datasets);
}

fn describe(ds: &Dataset) -> String {
    match ds {
        Dataset::Fixed(d) => {
            let mut s = format!("{} {}", d.data.element_type(), d.shape);
            if d.extensible {
                s.push_str(" extensible");
            }
            s
        }
        Dataset::Vlen(d) => format!("vlen {} [{}]", d.etype, d.entries.len()),
    }
}

fn print_tree(group: &GroupNode, depth: usize) {
    let indent = "  ".repeat(depth);
    for (name, child) in &group.children {
        match child {
            Node::Group(g) => {
                println!("{}{}/", indent, name);
                print_tree(g, depth + 1);
            }
            Node::Data(d) => println!("{}{}  ({})", indent, name, describe(d)),
        }
    }
}

fn tree_json(group: &GroupNode) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (name, child) in &group.children {
        let value = match child {
            Node::Group(g) => tree_json(g),
            Node::Data(Dataset::Fixed(d)) => serde_json::json!({
                "type": d.data.element_type().name(),
                "shape": d.shape.sizes(),
                "extensible": d.extensible,
            }),
            Node::Data(Dataset::Vlen(d)) => serde_json::json!({
                "type": d.etype.name(),
                "vlen": d.entries.len(),
            }),
        };
        map.insert(name.clone(), value);
    }
    serde_json::Value::Object(map)
}

fn cmd_tree(path: &str, json_mode: bool) {
    let (_, tree) = load(path);
    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "archive": path,
                "root": tree_json(&tree),
            }))
            .unwrap_or_default()
        );
    } else {
        println!("Archive: {}", path);
        print_tree(&tree, 0);
    }
}

fn cmd_model(name: &str, roots: &[&str]) {
    let engine: Engine = Engine::new(Config::from_env());
    match engine.create_model(name, roots) {
        Ok(path) => println!("Created {}", path.display()),
        Err(e) => {
            eprintln!("Failed to create model {}: {}", name, e);
            std::process::exit(1);
        }
    }
}
