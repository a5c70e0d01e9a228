fn main() -> anyhow::Result<()> {
    gl_cli::run()
}
