fn main() -> Result<(), Box<dyn std::error::Error>> {
    concierge::cli::main()
}
