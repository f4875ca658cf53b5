fn main() -> anyhow::Result<()> {
    switchboard::main()
}
