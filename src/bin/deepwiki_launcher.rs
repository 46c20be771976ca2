fn main() -> anyhow::Result<()> {
    deepwiki_launcher::cli::run()
}
