// Debug table of every slot, leaked without a transaction.

use meltdown::cli::main_x86;
use meltdown::Variant;

fn main() {
    std::process::exit(main_x86(Variant::Baseline));
}
