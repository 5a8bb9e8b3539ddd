//! weft demo CLI
//!
//! Renders a bundled demo scene — a keyed order list with a live counter —
//! and prints the serialized tree after every update tick, so the
//! reconciler's behavior can be eyeballed from a terminal.
//!
//! Usage:
//!   weft [OPTIONS]
//!
//! Options:
//!   -t, --ticks <N>     Number of update ticks to run (default 6)
//!   -c, --config <FILE> Engine configuration (TOML)
//!   -d, --dev           Enable development mode

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;

use clap::Parser;

use weft::{html, node_ref, on, Document, EngineConfig, NodeId, Value};

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Headless template rendering and reconciliation demo")]
struct Cli {
    /// Number of update ticks to run
    #[arg(short, long, default_value_t = 6)]
    ticks: u64,

    /// Engine configuration file (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Development mode: failed directives render inline placeholders
    #[arg(short, long)]
    dev: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match EngineConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };
    let config = if cli.dev { config.with_dev(true) } else { config };

    if let Err(e) = run(config, cli.ticks) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(config: EngineConfig, ticks: u64) -> weft::Result<()> {
    let doc = Document::with_config(config);
    let host = doc.create_element("div");
    doc.append_child(doc.root(), host);

    // Demo state: keyed rows plus a click counter wired to a button.
    let rows: Rc<RefCell<Vec<(i64, String)>>> = Rc::new(RefCell::new(
        (0..4).map(|i| (i, format!("order #{}", i))).collect(),
    ));
    let clicks = Rc::new(Cell::new(0i64));
    let button: Rc<Cell<Option<NodeId>>> = Rc::new(Cell::new(None));

    let on_click = {
        let clicks = clicks.clone();
        on("click", move || clicks.set(clicks.get() + 1))
    };
    let grab_button = {
        let button = button.clone();
        node_ref(move |node| button.set(Some(node)))
    };
    let count = {
        let clicks = clicks.clone();
        Value::func(move || Value::Int(clicks.get()))
    };
    let list = {
        let rows = rows.clone();
        Value::func(move || {
            rows.borrow()
                .iter()
                .map(|(id, label)| html!("<li>" {label.clone()} "</li>").key(*id))
                .collect::<Vec<_>>()
                .into()
        })
    };

    let app = html!(
        "<section><h1>orders</h1>"
        "<button " {on_click} " " {grab_button} ">add</button>"
        "<p>clicks: " {count} "</p>"
        "<ul>" {list} "</ul></section>"
    );

    app.cleanup(|| println!("-- cleanup fired: scene left the tree"))?;
    app.render(&doc, host)?;
    println!("initial:\n{}\n", doc.html());

    let scheduler = doc.scheduler();
    let mut next_id = 4;
    for tick in 1..=ticks {
        if let Some(node) = button.get() {
            doc.dispatch(node, "click");
        }

        // Cycle through the mutations the reconciler cares about.
        {
            let mut rows = rows.borrow_mut();
            match tick % 3 {
                0 => {
                    if rows.len() > 1 {
                        rows.remove(0);
                    }
                }
                1 => {
                    rows.push((next_id, format!("order #{}", next_id)));
                    next_id += 1;
                }
                _ => {
                    let len = rows.len();
                    if len > 2 {
                        rows.swap(1, len - 2);
                    }
                }
            }
        }

        app.update()?;
        scheduler.tick();
        println!("tick {}:\n{}\n", tick, doc.html());
    }

    // Tear the scene down and let the cleanup watcher notice.
    for node in doc.children(doc.root()) {
        doc.discard(node);
    }
    for _ in 0..doc.config().cleanup_interval {
        scheduler.tick();
    }

    Ok(())
}
