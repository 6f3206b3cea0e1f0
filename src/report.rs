use cache_side_channel::{Classification, LatencyTable};
use std::io::{self, Write};

/// `[0x41] 37`: slot in two-digit hex, latency in decimal cycles.
pub fn write_sample<W: Write + ?Sized>(out: &mut W, slot: usize, latency: u32) -> io::Result<()> {
    writeln!(out, "[{:#04x}] {}", slot, latency)
}

/// Every slot, in slot order.
pub fn write_table<W: Write + ?Sized>(out: &mut W, table: &LatencyTable) -> io::Result<()> {
    for (slot, latency) in table.iter() {
        write_sample(out, slot, latency)?;
    }
    Ok(())
}

pub fn write_winner<W: Write + ?Sized>(out: &mut W, classification: &Classification) -> io::Result<()> {
    write_sample(out, classification.slot, classification.latency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache_side_channel::Confidence;

    #[test]
    fn formats_like_printf() {
        let mut out = Vec::new();
        write_sample(&mut out, 0x5, 312).unwrap();
        write_sample(&mut out, 0xff, 4_000_000_000).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[0x05] 312\n[0xff] 4000000000\n");
    }

    #[test]
    fn table_has_one_line_per_slot() {
        let table = LatencyTable::new((0..256).map(|i| 100 + i).collect());
        let mut out = Vec::new();
        write_table(&mut out, &table).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 256);
        assert_eq!(lines[0], "[0x00] 100");
        assert_eq!(lines[255], "[0xff] 355");
    }

    #[test]
    fn winner_is_a_single_line() {
        let c = Classification {
            slot: 0x41,
            latency: 38,
            confidence: Confidence::Confident,
        };
        let mut out = Vec::new();
        write_winner(&mut out, &c).unwrap();
        assert_eq!(out, b"[0x41] 38\n");
    }
}
