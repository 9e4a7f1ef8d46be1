// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! CLI for running and testing individual parts of the dynamic
//! approximate-neighbourhood implementation against arc-list graphs.

use std::path::PathBuf;
use std::process::exit;
use std::time::Instant;

use clap::Parser;
use clap::Subcommand;
use rand::Rng;

use danf::bfs::MsBfs;
use danf::cover::DynamicVertexCover;
use danf::error::Error;
use danf::error::ErrorKind;
use danf::graph::load_arc_list;

/// Number of random sources the bfs tool starts from.
const BFS_SOURCES: usize = 1000;

/// Sources that advance in lockstep per search pass.
const BFS_BATCH: usize = 64;

#[derive(Parser)]
#[command(
    name = "danf",
    about = "Tools for the dynamic approximate-neighbourhood engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute a 2-approximate vertex cover of an arc-list graph.
    Vc {
        /// Path to the arc-list file.
        #[arg(short, long)]
        path: PathBuf,
    },
    /// Run a multi-source breadth-first search from 1000 random sources.
    Bfs {
        /// Path to the arc-list file.
        path: PathBuf,
    },
    /// Read the first nodes of an arc-list graph.
    Read {
        /// Path to the arc-list file.
        #[arg(short, long)]
        path: PathBuf,
        /// The number of nodes to read.
        #[arg(short, long)]
        numnodes: u64,
        /// Print each node's successors.
        #[arg(short = 'e', long)]
        print: bool,
    },
}

fn main() {
    let cli = Cli::try_parse().unwrap_or_else(|err| {
        use clap::error::ErrorKind as ClapError;
        // --help and --version are not usage errors.
        if matches!(err.kind(), ClapError::DisplayHelp | ClapError::DisplayVersion) {
            print!("{err}");
            exit(0);
        }
        eprint!("{err}");
        exit(1);
    });

    if let Err(err) = run(cli.command) {
        eprintln!("{err}");
        exit(if err.kind() == ErrorKind::Io { 2 } else { 1 });
    }
}

fn run(command: Command) -> Result<(), Error> {
    match command {
        Command::Vc { path } => vertex_cover(&path),
        Command::Bfs { path } => breadth_first(&path),
        Command::Read {
            path,
            numnodes,
            print,
        } => read_graph(&path, numnodes, print),
    }
}

fn vertex_cover(path: &PathBuf) -> Result<(), Error> {
    let start = Instant::now();
    let graph = load_arc_list(path)?;
    let cover = DynamicVertexCover::new(&graph);
    println!(
        "{} nodes, {} arcs: vertex cover of {} vertices from a matching of {} edges ({} ms)",
        graph.num_nodes(),
        graph.num_arcs(),
        cover.cover_size(),
        cover.matching_size(),
        start.elapsed().as_millis()
    );
    Ok(())
}

fn breadth_first(path: &PathBuf) -> Result<(), Error> {
    let graph = load_arc_list(path)?;
    if graph.num_nodes() == 0 {
        return Err(Error::invalid_argument("the graph has no nodes to search from"));
    }

    let mut rng = rand::thread_rng();
    let sources: Vec<u64> = (0..BFS_SOURCES)
        .map(|_| rng.gen_range(0..graph.num_nodes()))
        .collect();

    let start = Instant::now();
    let mut visits = 0u64;
    for batch in sources.chunks(BFS_BATCH) {
        let bfs: MsBfs = MsBfs::new(batch)?;
        bfs.run(&graph, u64::MAX, &mut |_depth: u64, _node: u64, mask: &mut u64| {
            visits += mask.count_ones() as u64;
        })?;
    }
    println!(
        "visited {} (source, node) pairs from {} sources in {} ms",
        visits,
        sources.len(),
        start.elapsed().as_millis()
    );
    Ok(())
}

fn read_graph(path: &PathBuf, numnodes: u64, print: bool) -> Result<(), Error> {
    let graph = load_arc_list(path)?;
    let mut cursor = graph.node_iterator(0);
    let mut read = 0u64;
    while read < numnodes {
        let Some(node) = cursor.next_node() else {
            break;
        };
        let outdegree = cursor.outdegree()?;
        if print {
            let successors: Vec<String> = cursor
                .successors()?
                .map(|successor| successor.to_string())
                .collect();
            println!("{node} ({outdegree}): {}", successors.join(" "));
        }
        read += 1;
    }
    println!("read {read} of {} nodes", graph.num_nodes());
    Ok(())
}
