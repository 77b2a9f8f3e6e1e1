//! Main entry point for CLI command to start the shipping subgraph tooling.

fn main() -> anyhow::Result<()> {
    apollo_inject::main()
}
