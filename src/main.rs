use meltdown::cli::main_x86;
use meltdown::Variant;

fn main() {
    std::process::exit(main_x86(Variant::Hardened));
}
