use std::io::Read;
use std::process;
use std::{fs, io};

use structopt::clap::AppSettings;
use structopt::StructOpt;

use crchound::preset;
use crchound::{Model, ModelFlags, Poly, PolyParseError, SearchFlags, Sink};

/// Minimum sample count for a search with reasonable confidence.
const RECOMMENDED_SAMPLES: usize = 4;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "crchound",
    about = "arbitrary-precision CRC calculator and algorithm finder",
    setting = AppSettings::DisableVersion,
    rename_all = "kebab"
)]
struct Opt {
    /// Calculate the CRC of each argument
    #[structopt(short = "c", long)]
    calc: bool,

    /// Calculate reversed CRCs
    #[structopt(short = "v", long)]
    reversed: bool,

    /// Dump the algorithm parameters
    #[structopt(short = "d", long)]
    dump: bool,

    /// List all preset algorithms
    #[structopt(short = "D", long)]
    list: bool,

    /// Echo (and reformat) the arguments
    #[structopt(short = "e", long)]
    echo: bool,

    /// Search for an algorithm that fits the arguments
    #[structopt(short = "s", long)]
    search: bool,

    /// Bits per character (1 to 64)
    #[structopt(short = "a", long, default_value = "8")]
    bits: usize,

    /// Bits per output character (defaults to the input size)
    #[structopt(short = "A", long)]
    out_bits: Option<usize>,

    /// Initial register value
    #[structopt(short = "i", long)]
    init: Option<Poly>,

    /// Generator in Koopman notation (implies the width)
    #[structopt(short = "k", long)]
    koopman: Option<Poly>,

    /// Preset algorithm name
    #[structopt(short = "m", long)]
    model: Option<String>,

    /// Generator polynomial, or search range start
    #[structopt(short = "p", long)]
    poly: Option<Poly>,

    /// Reversed generator polynomial (implies the width)
    #[structopt(short = "P", long)]
    rpoly: Option<Poly>,

    /// Search range end polynomial
    #[structopt(short = "q", long)]
    qpoly: Option<Poly>,

    /// Register size, in bits
    #[structopt(short = "w", long)]
    width: Option<usize>,

    /// Final register XOR value
    #[structopt(short = "x", long)]
    xorout: Option<Poly>,

    /// Big-endian CRC (RefIn and RefOut false)
    #[structopt(short = "b", long, conflicts_with = "little-endian")]
    big_endian: bool,

    /// Big-endian CRC output (RefOut false)
    #[structopt(short = "B", long)]
    big_endian_out: bool,

    /// Little-endian CRC (RefIn and RefOut true)
    #[structopt(short = "l", long)]
    little_endian: bool,

    /// Little-endian CRC output (RefOut true)
    #[structopt(short = "L", long)]
    little_endian_out: bool,

    /// Read the polynomials from the files named in the arguments
    #[structopt(short = "f", long)]
    files: bool,

    /// Skip the preset model scan
    #[structopt(short = "F", long)]
    skip_presets: bool,

    /// Skip the brute-force search pass
    #[structopt(short = "G", long)]
    skip_brute: bool,

    /// Non-augmenting algorithm
    #[structopt(short = "M", long)]
    non_augmenting: bool,

    /// Right-justified output
    #[structopt(short = "r", long)]
    right_just: bool,

    /// Left-justified output
    #[structopt(short = "t", long)]
    left_just: bool,

    /// Print spaces between output characters
    #[structopt(short = "S", long)]
    spaced: bool,

    /// Reverse the algorithm only; arguments must be pre-reversed
    #[structopt(short = "V", long)]
    reverse_model: bool,

    /// Print uppercase hexadecimal
    #[structopt(short = "X", long)]
    upper: bool,

    /// Low bytes first within file characters
    #[structopt(short = "y", long)]
    le_bytes: bool,

    /// Raw binary arguments
    #[structopt(short = "z", long)]
    raw: bool,

    /// Report every equivalent Init solution, not just the first
    #[structopt(short = "1", long)]
    exhaust: bool,

    /// Message strings, or file names with -f
    args: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Poly(#[from] PolyParseError),
    #[error("{path}: {source}")]
    Io { path: String, source: io::Error },
}

fn usage(msg: impl Into<String>) -> CliError {
    CliError::Usage(msg.into())
}

fn main() {
    env_logger::init();
    let opt = Opt::from_args();
    if let Err(err) = run(opt) {
        eprintln!("crchound: {}", err);
        process::exit(1);
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Calc,
    Reversed,
    Dump,
    List,
    Echo,
    Search,
}

fn resolve_mode(opt: &Opt) -> Result<Mode, CliError> {
    let picked: Vec<Mode> = [
        (opt.calc, Mode::Calc),
        (opt.reversed, Mode::Reversed),
        (opt.dump, Mode::Dump),
        (opt.list, Mode::List),
        (opt.echo, Mode::Echo),
        (opt.search, Mode::Search),
    ]
    .iter()
    .filter(|(on, _)| *on)
    .map(|(_, mode)| *mode)
    .collect();
    match picked.len() {
        0 => Err(usage("no mode switch specified, use --help for help")),
        1 => Ok(picked[0]),
        _ => Err(usage("more than one mode switch specified")),
    }
}

// fold the endianness and justification switches into the model flags
fn apply_switches(opt: &Opt, model: &mut Model, rflags: &mut SearchFlags) {
    if opt.little_endian {
        model.flags |= ModelFlags::REFIN | ModelFlags::REFOUT;
        model.flags -= ModelFlags::RTJUST;
        *rflags |= SearchFlags::HAVERI | SearchFlags::HAVERO;
    }
    if opt.little_endian_out {
        model.flags |= ModelFlags::REFOUT;
        model.flags -= ModelFlags::RTJUST;
        *rflags |= SearchFlags::HAVERO;
    }
    if opt.big_endian {
        model.flags -= ModelFlags::REFIN | ModelFlags::REFOUT;
        model.flags |= ModelFlags::RTJUST;
        *rflags |= SearchFlags::HAVERI | SearchFlags::HAVERO;
    }
    if opt.big_endian_out {
        model.flags -= ModelFlags::REFOUT;
        model.flags |= ModelFlags::RTJUST;
        *rflags |= SearchFlags::HAVERO;
    }
    if opt.right_just {
        model.flags |= ModelFlags::RTJUST;
    }
    if opt.left_just {
        model.flags -= ModelFlags::RTJUST;
    }
    if opt.spaced {
        model.flags |= ModelFlags::SPACE;
    }
    if opt.upper {
        model.flags |= ModelFlags::UPPER;
    }
    if opt.le_bytes {
        model.flags |= ModelFlags::LTLBYT;
    }
    if opt.raw {
        model.flags |= ModelFlags::DIRECT;
    }
    if opt.exhaust {
        model.flags |= ModelFlags::EXHST;
    }
    if opt.non_augmenting {
        model.flags -= ModelFlags::MULXN;
    }
}

fn read_argument(name: &str, from_file: bool, flags: ModelFlags, bits: usize) -> Result<Poly, CliError> {
    if !from_file {
        return Ok(Poly::from_text(name, flags, bits)?);
    }
    let bytes = if name == "-" {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .map_err(|source| CliError::Io { path: name.into(), source })?;
        buf
    } else {
        fs::read(name).map_err(|source| CliError::Io { path: name.into(), source })?
    };
    Ok(Poly::from_raw_chars(&bytes, flags, bits))
}

// scan the preset table for models that solve every argument
fn scan_presets(
    model: &Model,
    rflags: SearchFlags,
    width: usize,
    args: &[Poly],
    report: &mut dyn FnMut(&Model),
) -> bool {
    let mut found = false;
    for index in 0..preset::count() {
        let pset = match preset::by_index(index) {
            Some(pset) => pset,
            None => break,
        };
        // skip presets of a different width or reflection sense
        if pset.width() != width {
            continue;
        }
        if (model.flags ^ pset.flags) & (ModelFlags::REFIN | ModelFlags::REFOUT)
            != ModelFlags::empty()
        {
            continue;
        }
        // skip presets that contradict the specified parameters
        if rflags.contains(SearchFlags::HAVEP) && model.spoly != pset.spoly {
            continue;
        }
        if rflags.contains(SearchFlags::HAVEI) && model.init != pset.init {
            continue;
        }
        if rflags.contains(SearchFlags::HAVEX) && model.xorout != pset.xorout {
            continue;
        }
        let mut xor = pset.xorout.clone();
        if pset.flags.contains(ModelFlags::REFOUT) {
            xor.reverse();
        }
        let solved = args
            .iter()
            .all(|arg| arg.crc(&pset.spoly, &pset.init, &xor, ModelFlags::empty()).is_zero());
        if solved {
            report(&pset);
            found = true;
        }
    }
    found
}

struct Console;

impl Sink for Console {
    fn found(&mut self, model: &Model) {
        println!("{}", model);
    }

    fn progress(&mut self, factor: &Poly, flags: ModelFlags, seq: u64) {
        // the zeroth report fires before any work has been done
        if seq == 0 {
            return;
        }
        eprintln!(
            "crchound: searching: width={} poly=0x{} refin={} refout={}",
            factor.len(),
            factor.to_text(ModelFlags::RTJUST, 4),
            flags.contains(ModelFlags::REFIN),
            flags.contains(ModelFlags::REFOUT),
        );
    }
}

fn run(opt: Opt) -> Result<(), CliError> {
    let mode = resolve_mode(&opt)?;
    let ibits = opt.bits;
    let obits = opt.out_bits.unwrap_or(ibits);
    if !(1..=64).contains(&ibits) || !(1..=64).contains(&obits) {
        return Err(usage("bits per character must be between 1 and 64"));
    }

    let mut model = Model::default();
    let mut rflags = SearchFlags::empty();
    let mut qpoly = Poly::zero();
    let mut width = 0usize;

    if let Some(name) = &opt.model {
        model = preset::by_name(name)
            .ok_or_else(|| usage(format!("preset model '{}' not found, use -D to list presets", name)))?;
        width = model.width();
        rflags |= SearchFlags::HAVEP
            | SearchFlags::HAVEI
            | SearchFlags::HAVERI
            | SearchFlags::HAVERO
            | SearchFlags::HAVEX;
    }
    apply_switches(&opt, &mut model, &mut rflags);

    if let Some(kpoly) = &opt.koopman {
        model.spoly = kpoly.clone();
        model.spoly.kchop();
        width = model.spoly.len();
        rflags |= SearchFlags::HAVEP;
        model.novel();
    }
    if let Some(rpoly) = &opt.rpoly {
        model.spoly = rpoly.clone();
        model.spoly.kchop();
        model.spoly.reciprocal();
        width = model.spoly.len();
        rflags |= SearchFlags::HAVEP;
        model.novel();
    }
    if let Some(poly) = &opt.poly {
        model.spoly = poly.clone();
        rflags |= SearchFlags::HAVEP;
        model.novel();
        if !model.spoly.is_empty() && !model.spoly.coeff(model.spoly.len() - 1) {
            eprintln!(
                "crchound: warning: POLY has no +1 term; did you mean -P 0x{}?",
                model.spoly.to_text(ModelFlags::RTJUST, 4)
            );
        }
    }
    if let Some(init) = &opt.init {
        model.init = init.clone();
        rflags |= SearchFlags::HAVEI;
        model.novel();
    }
    if let Some(xorout) = &opt.xorout {
        model.xorout = xorout.clone();
        rflags |= SearchFlags::HAVEX;
        model.novel();
    }
    if let Some(q) = &opt.qpoly {
        qpoly = q.clone();
        rflags -= SearchFlags::HAVEP;
        rflags |= SearchFlags::HAVEQ;
    }
    if let Some(w) = opt.width {
        width = w;
    }
    if width == 0 {
        width = model.spoly.len();
    }

    // expand or trim the parameters to the chosen width, whichever
    // order they were given in
    model.spoly.right(width);
    model.init.right(width);
    model.xorout.right(width);
    qpoly.right(width);

    if opt.reverse_model {
        model.reverse();
    }
    if mode != Mode::Search {
        model.canon();
    }

    match mode {
        Mode::Calc | Mode::Reversed => {
            if mode == Mode::Reversed {
                // the arguments and output are mirrored as well, so
                // the reflection senses stay put and Init and XorOut
                // trade places as mirror images
                model.spoly.reciprocal();
                if !model.flags.contains(ModelFlags::REFOUT) {
                    model.init.reverse();
                    model.xorout.reverse();
                }
                std::mem::swap(&mut model.init, &mut model.xorout);
            }
            // XorOut follows the reflection stage, which formatting
            // applies on output
            if model.flags.contains(ModelFlags::REFOUT) {
                model.xorout.reverse();
            }
            for name in &opt.args {
                let mut arg = read_argument(name, opt.files, model.flags, ibits)?;
                if mode == Mode::Reversed {
                    arg.reverse();
                }
                let mut crc = arg.crc(&model.spoly, &model.init, &model.xorout, model.flags);
                if mode == Mode::Reversed {
                    crc.reverse();
                }
                println!("{}", crc.to_text(model.flags, obits));
            }
        }
        Mode::Dump => {
            if !model.flags.contains(ModelFlags::MULXN) {
                return Err(usage("not a Williams model compliant algorithm"));
            }
            println!("{}", model);
        }
        Mode::List => {
            for index in 0..preset::count() {
                if let Some(pset) = preset::by_index(index) {
                    println!("{}", pset);
                }
            }
        }
        Mode::Echo => {
            for name in &opt.args {
                let mut arg = read_argument(name, opt.files, model.flags, ibits)?;
                if model.init.len() <= arg.len() {
                    arg.xor_at(&model.init, 0);
                }
                println!("{}", arg.to_text(model.flags, obits));
            }
        }
        Mode::Search => {
            run_search(&opt, model, qpoly, rflags, width, ibits)?;
        }
    }
    Ok(())
}

fn run_search(
    opt: &Opt,
    mut model: Model,
    qpoly: Poly,
    mut rflags: SearchFlags,
    width: usize,
    ibits: usize,
) -> Result<(), CliError> {
    if !model.flags.contains(ModelFlags::MULXN) {
        return Err(usage("cannot search for non-Williams compliant models"));
    }
    if width == 0 {
        return Err(usage("must specify positive -k, -P or -w before -s"));
    }

    // a zero range end means searching to the end of the space
    if qpoly.is_zero() {
        rflags -= SearchFlags::HAVEQ;
    }

    match opt.args.len() {
        0 => eprintln!("crchound: warning: you have not given any samples"),
        n if n < RECOMMENDED_SAMPLES => {
            eprintln!(
                "crchound: warning: you have only given {} sample{}",
                n,
                if n == 1 { "" } else { "s" }
            );
            eprintln!(
                "crchound: warning: to reduce false positives, give {} or more samples",
                RECOMMENDED_SAMPLES
            );
        }
        _ => {}
    }

    let mut args = Vec::with_capacity(opt.args.len());
    for name in &opt.args {
        let arg = read_argument(name, opt.files, model.flags, ibits)?;
        if arg.len() < width {
            return Err(usage(format!("sample '{}' is shorter than the width", name)));
        }
        args.push(arg);
    }

    let mut found = false;

    // scan the preset table first, trying the other reflection sense
    // when it is free
    if !opt.skip_presets {
        for _pass in 0..2 {
            found |= scan_presets(&model, rflags, width, &args, &mut |m| println!("{}", m));
            if rflags.contains(SearchFlags::HAVERI) {
                break;
            }
            model.flags.toggle(ModelFlags::REFIN | ModelFlags::REFOUT);
            for arg in args.iter_mut() {
                arg.reflect_chars(ibits);
            }
        }
    }
    if found {
        return Ok(());
    }
    // with the generator fixed, completing the model is not a brute
    // force pass, so -G does not suppress it
    if opt.skip_brute && !rflags.contains(SearchFlags::HAVEP) {
        return Err(usage("no models found"));
    }
    if model.flags.contains(ModelFlags::REFIN) != model.flags.contains(ModelFlags::REFOUT) {
        return Err(usage("cannot search for crossed-endian models"));
    }

    let mut console = Console;
    for _pass in 0..2 {
        let candidates = crchound::reveng(&model, &qpoly, rflags, &args, &mut console);
        found |= !candidates.is_empty();
        if rflags.contains(SearchFlags::HAVERI) {
            break;
        }
        model.flags.toggle(ModelFlags::REFIN | ModelFlags::REFOUT);
        for arg in args.iter_mut() {
            arg.reflect_chars(ibits);
        }
    }
    if !found {
        return Err(usage("no models found"));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample(payload: &[u8], model: &Model) -> Poly {
        let mut msg = Poly::from_bytes(payload);
        if model.flags.contains(ModelFlags::REFIN) {
            msg.reflect_chars(8);
        }
        let mut xor = model.xorout.clone();
        if model.flags.contains(ModelFlags::REFOUT) {
            xor.reverse();
        }
        let crc = msg.crc(&model.spoly, &model.init, &xor, ModelFlags::MULXN);
        let mut out = Poly::with_len(msg.len() + model.width());
        out.xor_at(&msg, 0);
        out.xor_at(&crc, msg.len());
        out
    }

    #[test]
    fn preset_scan_matches_arc() {
        let arc = preset::by_name("CRC-16/ARC").unwrap();
        let args = [sample(b"hound", &arc), sample(b"trail", &arc)];
        let mut names = Vec::new();
        let found = scan_presets(
            &arc,
            SearchFlags::empty(),
            16,
            &args,
            &mut |m| names.push(m.name.clone().unwrap_or_default()),
        );
        assert!(found);
        assert!(names.contains(&"CRC-16/ARC".to_string()));

        // the other reflection sense matches nothing
        let mut flipped = arc.clone();
        flipped.flags -= ModelFlags::REFIN | ModelFlags::REFOUT;
        let found = scan_presets(&flipped, SearchFlags::empty(), 16, &args, &mut |_| {});
        assert!(!found);
    }

    #[test]
    fn preset_scan_honours_fixed_parameters() {
        let kermit = preset::by_name("CRC-16/KERMIT").unwrap();
        let args = [sample(b"scent", &kermit)];
        // pinning a different Init excludes the only match
        let mut pinned = kermit.clone();
        pinned.init = Poly::from_value(16, 0x1d0f);
        let found = scan_presets(&pinned, SearchFlags::HAVEI, 16, &args, &mut |_| {});
        assert!(!found);
        let found = scan_presets(&kermit, SearchFlags::HAVEI, 16, &args, &mut |_| {});
        assert!(found);
    }

    #[test]
    fn switches_fold_into_flags() {
        let mut opt = Opt::from_iter(["crchound", "-s"]);
        opt.little_endian = true;
        let mut model = Model::default();
        let mut rflags = SearchFlags::empty();
        apply_switches(&opt, &mut model, &mut rflags);
        assert!(model.flags.contains(ModelFlags::REFIN | ModelFlags::REFOUT));
        assert!(rflags.contains(SearchFlags::HAVERI | SearchFlags::HAVERO));

        opt.little_endian = false;
        opt.big_endian = true;
        opt.upper = true;
        let mut model = Model::default();
        let mut rflags = SearchFlags::empty();
        apply_switches(&opt, &mut model, &mut rflags);
        assert!(!model.flags.contains(ModelFlags::REFIN));
        assert!(model.flags.contains(ModelFlags::RTJUST | ModelFlags::UPPER));
    }

    #[test]
    fn mode_resolution() {
        let opt = Opt::from_iter(["crchound", "-c", "31"]);
        assert!(matches!(resolve_mode(&opt), Ok(Mode::Calc)));
        let opt = Opt::from_iter(["crchound", "31"]);
        assert!(resolve_mode(&opt).is_err());
        let opt = Opt::from_iter(["crchound", "-c", "-s"]);
        assert!(resolve_mode(&opt).is_err());
    }
}
