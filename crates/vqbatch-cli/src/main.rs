//! `vqbatch` entrypoint.

#[tokio::main]
async fn main() {
    let exit_code = vqbatch_cli::run().await;
    std::process::exit(exit_code);
}
