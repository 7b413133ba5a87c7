use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::config::RollupConfig;
use crate::model::RegionNode;
use crate::rollup::{NodeUpdate, PassReport, Rollup, UnitOutcome, UpdateOutcome};
use crate::store::{QueryResult, Statement, Store, Value};
use crate::tree::TreeItem;

const COLUMN_WIDTH: usize = 20;

const HELP: &str = "\
Commands:
  rollup    recompute and write back every region's counters
  regions   show the region table as stored
  tree      show the recomputed hierarchy without writing it
  help      show this message
  exit      leave the console";

/// Line console for driving rollup passes by hand.
pub struct Repl<S: Store> {
    store: S,
    config: RollupConfig,
    rl: DefaultEditor,
}

impl<S: Store> Repl<S> {
    pub fn new(store: S, config: RollupConfig) -> rustyline::Result<Self> {
        Ok(Self {
            store,
            config,
            rl: DefaultEditor::new()?,
        })
    }

    pub async fn run(&mut self) {
        println!("Region rollup console");
        println!("Type 'help' for commands or 'exit' to quit");

        loop {
            let readline = self.rl.readline("rollup> ");
            match readline {
                Ok(line) => {
                    let command = line.trim();
                    if command.is_empty() {
                        continue;
                    }

                    let _ = self.rl.add_history_entry(command);

                    match command.to_ascii_lowercase().as_str() {
                        "exit" | "quit" => {
                            println!("Goodbye!");
                            break;
                        }
                        "help" => println!("{HELP}"),
                        "rollup" => self.rollup().await,
                        "regions" => self.regions().await,
                        "tree" => self.tree().await,
                        other => eprintln!("Unknown command '{other}'. Type 'help' for commands"),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {err}");
                    break;
                }
            }
        }
    }

    async fn rollup(&mut self) {
        let mut rollup = Rollup::new(&mut self.store, self.config.clone());
        match rollup.run_pass().await {
            Ok(report) => print_report(&report),
            Err(e) => {
                if !e.updates().is_empty() {
                    print_updates(e.updates());
                }
                eprintln!("Error: {e}");
            }
        }
    }

    async fn regions(&self) {
        let stmt = Statement::Select {
            table_name: self.config.region.table.clone(),
            columns: vec![],
            conditions: vec![],
        };
        match self.store.query(&stmt).await {
            Ok(result) => print_result(&result),
            Err(e) => eprintln!("Error: {e}"),
        }
    }

    async fn tree(&mut self) {
        let rollup = Rollup::new(&mut self.store, self.config.clone());
        match rollup.preview().await {
            Ok(trees) => trees.iter().for_each(print_tree),
            Err(e) => eprintln!("Error: {e}"),
        }
    }
}

/// Prints rows under a fixed-width header.
pub fn print_result(result: &QueryResult) {
    for col in &result.columns {
        print!("{col:COLUMN_WIDTH$}");
    }
    println!();

    for _ in 0..result.columns.len() {
        print!("{}", "-".repeat(COLUMN_WIDTH));
    }
    println!();

    for row in &result.rows {
        for value in row {
            let display = match value {
                Value::String(s) => s.clone(),
                Value::Null => "NULL".to_string(),
                other => other.to_string(),
            };
            print!("{display:COLUMN_WIDTH$}");
        }
        println!();
    }
}

/// Prints one line per region update.
pub fn print_updates(updates: &[NodeUpdate]) {
    let columns = ["region", "counters", "result"];
    for col in columns {
        print!("{col:COLUMN_WIDTH$}");
    }
    println!();
    println!("{}", "-".repeat(COLUMN_WIDTH * columns.len()));

    for update in updates {
        let result = match &update.outcome {
            UpdateOutcome::Applied { rows } => format!("{rows} row(s)"),
            UpdateOutcome::Failed { reason } => format!("FAILED: {reason}"),
            UpdateOutcome::RolledBack { rows } => format!("{rows} row(s), rolled back"),
        };
        println!(
            "{:COLUMN_WIDTH$}{:COLUMN_WIDTH$}  {}",
            update.region_id,
            update.totals.to_string(),
            result
        );
    }
}

/// Prints the region updates and a summary of the pass.
pub fn print_report(report: &PassReport) {
    print_updates(&report.updates);
    println!();
    println!(
        "{} region(s) loaded, root(s): {}",
        report.regions_loaded,
        report.roots.join(", ")
    );
    if !report.skipped_roots.is_empty() {
        println!("Skipped root(s): {}", report.skipped_roots.join(", "));
    }
    if report.orphaned_leaf_rows > 0 {
        println!(
            "{} leaf row(s) reference unknown regions",
            report.orphaned_leaf_rows
        );
    }
    match report.unit {
        UnitOutcome::AutoCommit => {}
        UnitOutcome::Committed => println!("Transaction committed"),
        UnitOutcome::RolledBack => println!("Transaction rolled back, nothing was written"),
    }
}

/// Prints a folded tree, one region per line, indented by depth.
pub fn print_tree(tree: &TreeItem<RegionNode>) {
    for (depth, node) in tree.iter_with_depth() {
        println!("{}{}  {}", "  ".repeat(depth), node.id, node.totals);
    }
}
