fn main() -> Result<(), Box<dyn std::error::Error>> {
    chitter::cli::main()
}
