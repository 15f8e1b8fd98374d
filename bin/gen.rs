use clap::{Arg, ArgAction, Command};
use domain_ingest::TARGET_COLUMNS;
use std::io::{self, Write};

/// Header spelled the way the Majestic export does.
const MAJESTIC_HEADER: [&str; 12] = [
    "GlobalRank",
    "TldRank",
    "Domain",
    "TLD",
    "RefSubNets",
    "RefIPs",
    "IDN_Domain",
    "IDN_TLD",
    "PrevGlobalRank",
    "PrevTldRank",
    "PrevRefSubNets",
    "PrevRefIPs",
];

const TLDS: [&str; 5] = ["com", "org", "net", "io", "de"];

fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .about("Write a synthetic Majestic Million CSV to stdout")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(
            Arg::new("snake_header")
                .long("snake-header")
                .help("Use snake_case column names")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("shuffle_header")
                .long("shuffle-header")
                .help("Put Domain and TLD first")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let rows: u64 = matches.get_one::<u64>("rows").copied().unwrap_or(0);
    let names: [&str; 12] = if matches.get_flag("snake_header") {
        TARGET_COLUMNS
    } else {
        MAJESTIC_HEADER
    };

    // column order as positions into the canonical layout
    let mut order: Vec<usize> = (0..names.len()).collect();
    if matches.get_flag("shuffle_header") {
        order.rotate_left(2);
    }

    let mut out = io::BufWriter::new(io::stdout().lock());
    let header: Vec<&str> = order.iter().map(|&i| names[i]).collect();
    writeln!(&mut out, "{}", header.join(","))?;

    let mut tld_rank = [0u64; TLDS.len()];
    for i in 0..rows {
        let rank = i + 1;
        let t = (i % TLDS.len() as u64) as usize;
        tld_rank[t] += 1;
        let tld = TLDS[t];
        let domain = format!("site{rank:07}.{tld}");
        let subnets = 500_000u64.saturating_sub(i % 500_000);
        let ips = subnets * 2;
        let fields = [
            rank.to_string(),
            tld_rank[t].to_string(),
            domain.clone(),
            tld.to_string(),
            subnets.to_string(),
            ips.to_string(),
            domain,
            tld.to_string(),
            rank.to_string(),
            tld_rank[t].to_string(),
            subnets.saturating_sub(1).to_string(),
            ips.saturating_sub(1).to_string(),
        ];
        let line: Vec<&str> = order.iter().map(|&c| fields[c].as_str()).collect();
        writeln!(&mut out, "{}", line.join(","))?;
        if i % 10_000 == 0 {
            out.flush()?;
        } // keep buffers moving on huge runs
    }

    out.flush()?;
    Ok(())
}
