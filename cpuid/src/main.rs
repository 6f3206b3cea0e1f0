use cpuid::{get_family_model_stepping, Features};

fn main() {
    let (vendor, family_model, stepping) = get_family_model_stepping();
    println!("Vendor: {:?}", vendor);
    println!("Family/Model: {:#06x} stepping {}", family_model, stepping);
    println!("{:#?}", Features::detect());
}
