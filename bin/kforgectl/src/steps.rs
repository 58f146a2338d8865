//! ---
//! kf_section: "06-cli"
//! kf_subsection: "binary"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Pipeline step listing."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use clap::Args;
use kforge_engine::{listing, Pipeline};

#[derive(Debug, Args)]
pub struct StepsArgs {
    /// List the update pipeline instead of the deploy pipeline.
    #[arg(long)]
    update: bool,
}

pub fn pipeline(update: bool) -> Pipeline {
    if update {
        Pipeline::Update
    } else {
        Pipeline::Deploy
    }
}

pub fn print(pipeline: Pipeline) {
    for line in listing(pipeline) {
        println!("{}", line);
    }
}

pub fn run(args: StepsArgs) {
    print(pipeline(args.update));
}
