/// Display version information
pub fn execute() {
    println!("rangerblock {}", env!("CARGO_PKG_VERSION"));
    println!("Trust and ledger node for the RangerBlock relay network");
}
