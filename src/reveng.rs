use core::mem;

use log::debug;

use crate::model::{Model, ModelFlags};
use crate::poly::Poly;

bitflags::bitflags! {
    /// Which parts of a guessed model are already fixed, plus the
    /// search-internal state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SearchFlags: u32 {
        /// The generator polynomial is known.
        const HAVEP  = 1 << 0;
        /// Init is known.
        const HAVEI  = 1 << 1;
        /// XorOut is known.
        const HAVEX  = 1 << 2;
        /// The input reflection sense is fixed.
        const HAVERI = 1 << 3;
        /// The output reflection sense is fixed.
        const HAVERO = 1 << 4;
        /// The range end polynomial is meaningful.
        const HAVEQ  = 1 << 5;
        /// Set by the engine when the difference GCD is compact and
        /// only a short factor can be searched for.
        const SHORT  = 1 << 6;
    }
}

/// Progress reports fire every `PROGRESS_MASK + 1` search iterations.
pub const PROGRESS_MASK: u64 = 0xffff;

/// Host callbacks for the engine.
///
/// `found` fires once per confirmed model, before the next candidate
/// is tried; `progress` ticks during the factor search with a
/// sequence number starting at zero (hosts conventionally suppress
/// the zeroth report).
pub trait Sink {
    fn found(&mut self, model: &Model);
    fn progress(&mut self, _factor: &Poly, _flags: ModelFlags, _seq: u64) {}
}

/// A sink that discards everything.
impl Sink for () {
    fn found(&mut self, _model: &Model) {}
}

/// Complete the parameters of a model by calculation or brute search.
///
/// `guess` carries the fixed parameters named by `rflags`, the search
/// width (as the length of its `spoly`, whose value is also the range
/// start when the generator is unknown) and the reflection senses in
/// its flags. `args` are the sample (message then CRC) bit-strings, in
/// the same reflection domain as the guess. Confirmed models are
/// returned in discovery order; no solution is an empty list.
pub fn reveng(
    guess: &Model,
    qpoly: &Poly,
    rflags: SearchFlags,
    args: &[Poly],
    sink: &mut dyn Sink,
) -> Vec<Model> {
    let mut results = Vec::new();
    let zero = Poly::zero();
    let mut rflags = rflags;

    if rflags.contains(SearchFlags::HAVEP) {
        // the poly is known; engineer, calculate or check Init and
        // XorOut
        if !guess.spoly.is_empty() {
            dispatch(guess, &mut results, &guess.spoly, rflags, args, sink);
        }
        return results;
    }

    if guess.spoly.is_empty() {
        return results;
    }
    let width = guess.spoly.len();

    // the GCD of all differences between the arguments
    let mut gcd = gcd_of_differences(&guess.init, rflags, args);
    debug!("difference gcd spans {} bits for width {}", gcd.len(), width);

    // too short a difference leaves nothing to work with
    if gcd.len() < width + 1 {
        return results;
    }

    // if the shortest difference is the right length for the
    // generator (with its top term), it *is* the generator
    if gcd.len() == width + 1 {
        let gpoly = gcd.shift(0, 1, gcd.len(), 0);
        if !rflags.contains(SearchFlags::HAVEQ) || gpoly < *qpoly {
            dispatch(guess, &mut results, &gpoly, rflags, args, sink);
        }
        return results;
    }

    let mut factor = guess.spoly.clone();
    let mut qq = if rflags.contains(SearchFlags::HAVEQ) {
        qpoly.clone()
    } else {
        Poly::zero()
    };

    // truncate the trial factor and range end if the shortest
    // difference is compact
    rflags.remove(SearchFlags::SHORT);
    if gcd.len() <= factor.len() * 2 {
        rflags.insert(SearchFlags::SHORT);
        let flen = gcd.len() - factor.len() - 1;
        debug!("short gcd regime, trial factors span {} bits", flen);
        if rflags.contains(SearchFlags::HAVEQ) || !factor.is_zero() {
            // the largest factor expressible in the truncated space
            let mut top = Poly::with_len(flen);
            top.invert();
            top.right(factor.len());
            if top < factor {
                // start polynomial out of range
                return results;
            } else if top < qq {
                // end polynomial out of range, stop on rollover
                rflags.remove(SearchFlags::HAVEQ);
            } else if rflags.contains(SearchFlags::HAVEQ) {
                qq.right(flen);
            }
        }
        factor.right(flen);
    }

    // clear the least significant term; every generator has one, so
    // iteration steps by two
    factor.set_coeff(factor.len() - 1, false);

    let mut spin: u64 = 0;
    let mut seq: u64 = 0;
    let mut gpoly = Poly::zero();
    while factor.inc() && (!rflags.contains(SearchFlags::HAVEQ) || factor < qq) {
        if spin & PROGRESS_MASK == 0 {
            sink.progress(&factor, guess.flags, seq);
            seq += 1;
        }
        spin += 1;

        let rem;
        if rflags.contains(SearchFlags::SHORT) {
            // test whether the cofactor divides the GCD
            rem = gcd.crc(&factor, &zero, &zero, ModelFlags::empty());
            if rem.is_zero() {
                // repeat the division for the quotient, which is the
                // generator; chop it and restore the +1 term
                let (_, quot) = gcd.crc_with_quotient(&factor, &zero, &zero, ModelFlags::empty());
                gpoly = quot.shift(0, 1, quot.len() - 1, 1);
                gpoly.inc();
            }
        } else {
            // straight division of the GCD by the factor
            rem = gcd.crc(&factor, &zero, &zero, ModelFlags::empty());
        }
        if rem.is_zero() {
            let divisor = if rflags.contains(SearchFlags::SHORT) { &gpoly } else { &factor };
            dispatch(guess, &mut results, divisor, rflags, args, sink);
        }
        if !factor.inc() {
            break;
        }
    }
    results
}

/// The GCD of pairwise differences of the arguments.
///
/// Equal-length pairs difference directly. Unequal-length pairs are
/// usable only when Init is known: the shorter is right-aligned
/// against the longer and `init` is folded in at both the left end
/// and at the length difference, cancelling its contribution to the
/// shorter sample.
fn gcd_of_differences(init: &Poly, rflags: SearchFlags, args: &[Poly]) -> Poly {
    let mut gcd = Poly::zero();
    if args.len() < 2 {
        return gcd;
    }
    let mut have_gcd = false;
    for (j, a) in args.iter().enumerate() {
        for b in &args[j + 1..] {
            let mut work = if a.len() == b.len() {
                let mut w = a.clone();
                w.xor_at(b, 0);
                w
            } else if rflags.contains(SearchFlags::HAVEI) {
                let (short, long) = if a.len() < b.len() { (a, b) } else { (b, a) };
                let mut w = long.clone();
                w.xor_at(short, long.len() - short.len());
                w.xor_at(init, 0);
                w.xor_at(init, long.len() - short.len());
                w
            } else {
                Poly::zero()
            };
            work.norm();
            if work.is_empty() {
                continue;
            }
            if !have_gcd {
                gcd = work;
                have_gcd = true;
                continue;
            }
            // Euclidean reduction; the explicit swap keeps the
            // longer operand as the dividend
            loop {
                if gcd.len() < work.len() {
                    mem::swap(&mut gcd, &mut work);
                }
                let mut rem = gcd.rem(&work);
                rem.norm();
                gcd = work;
                work = rem;
                if work.is_empty() {
                    break;
                }
            }
        }
    }
    gcd
}

fn dispatch(
    guess: &Model,
    results: &mut Vec<Model>,
    divisor: &Poly,
    rflags: SearchFlags,
    args: &[Poly],
    sink: &mut dyn Sink,
) {
    if rflags.contains(SearchFlags::HAVEI) && rflags.contains(SearchFlags::HAVEX) {
        chkres(results, divisor, &guess.init, guess.flags, &guess.xorout, args, sink);
    } else if rflags.contains(SearchFlags::HAVEI) {
        calout(results, divisor, &guess.init, guess.flags, args, sink);
    } else if rflags.contains(SearchFlags::HAVEX) {
        calini(results, divisor, guess.flags, &guess.xorout, args, sink);
    } else {
        engini(results, divisor, guess.flags, args, sink);
    }
}

// a matrix row is either a shared sentinel or an owned polynomial
enum Row {
    Zero,
    Unit,
    Owned(Poly),
}

fn row_parity(solution: &Poly, row: &Row, unit: &Poly) -> bool {
    match row {
        Row::Zero => false,
        Row::Unit => solution.masked_parity(unit),
        Row::Owned(p) => solution.masked_parity(p),
    }
}

/// Recover Init values implied by the arguments.
///
/// Method from Ewing, "Reverse-Engineering a CRC Algorithm"
/// (Christchurch: University of Canterbury, 2010): express each bit
/// of the register's Init contribution as a linear form over GF(2),
/// reduce the system to row echelon form and back-substitute. Free
/// variables are enumerated by carry propagation when
/// [`ModelFlags::EXHST`] is set; otherwise only the first solution is
/// taken.
fn engini(
    results: &mut Vec<Model>,
    divisor: &Poly,
    flags: ModelFlags,
    args: &[Poly],
    sink: &mut dyn Sink,
) {
    let dlen = divisor.len();
    let zero = Poly::zero();

    // the two shortest arguments of distinct lengths
    let mut ai = 0;
    let mut bi = 0;
    let mut alen = args.first().map_or(0, Poly::len);
    let mut blen = alen;
    for (i, arg) in args.iter().enumerate().skip(1) {
        let ilen = arg.len();
        if ilen < alen {
            bi = ai;
            blen = alen;
            ai = i;
            alen = ilen;
        } else if ilen > alen && (ai == bi || ilen < blen) {
            bi = i;
            blen = ilen;
        }
    }
    if ai == bi || dlen == 0 {
        // no length contrast to work with; assume a zero XorOut and
        // calculate Init from that
        calini(results, divisor, flags, &Poly::with_len(dlen), args, sink);
        return;
    }

    let one = Poly::from_value(1, 1);

    // potential contribution of the bottom bit of Init, as a sentinel
    // polynomial with a term at each argument length
    let mut apoly;
    if blen < dlen * 2 {
        apoly = Poly::with_len(dlen);
        apoly.xor_at(&one, dlen * 2 - 1 - blen);
        apoly.xor_at(&one, dlen * 2 - 1 - alen);
    } else {
        apoly = Poly::with_len(blen - dlen + 1);
        apoly.xor_at(&one, 0);
        apoly.xor_at(&one, blen - alen);
    }
    let seed = if apoly.len() > dlen {
        apoly.crc(divisor, &zero, &zero, ModelFlags::empty())
    } else {
        apoly
    };

    // actual contribution of Init across the two arguments
    let a_res = args[ai].crc(divisor, &zero, &zero, ModelFlags::empty());
    let target = args[bi].crc(divisor, &zero, &a_res, ModelFlags::empty());

    // each subsequent row models one shift of the initial register
    let one_step = Poly::with_len(1);
    let mut basis = Vec::with_capacity(dlen);
    basis.push(seed);
    for k in 1..dlen {
        let next = one_step.crc(divisor, &basis[k - 1], &zero, ModelFlags::MULXN);
        basis.push(next);
    }

    // transpose into augmented rows and reduce to row echelon form
    let mut unit = Poly::with_len(dlen + 1);
    unit.xor_at(&one, dlen);
    let mut mat: Vec<Row> = (0..dlen).map(|_| Row::Zero).collect();
    for i in 0..dlen {
        let mut row = Poly::zero();
        for j in 0..dlen {
            row.paste(&basis[dlen - 1 - j], i, j, j + 1, dlen + 1);
        }
        if !row.is_zero() {
            row.paste(&target, i, dlen, dlen + 1, dlen + 1);
        }
        let mut j = row.first_one();
        while j < dlen {
            match &mat[j] {
                Row::Zero => break,
                Row::Unit => row.xor_at(&unit, 0),
                Row::Owned(p) => row.xor_at(p, 0),
            }
            j = row.first_one();
        }
        if j < dlen {
            mat[j] = Row::Owned(row);
        }
    }

    // enumerate solutions; free rows toggle between the sentinels
    // like a binary counter
    loop {
        let mut solution = unit.clone();
        for i in 0..dlen {
            if row_parity(&solution, &mat[dlen - 1 - i], &unit) {
                solution.xor_at(&one, dlen - 1 - i);
            }
        }
        // trim the augment bit
        solution.resize(dlen);
        calout(results, divisor, &solution, flags, args, sink);

        if !flags.contains(ModelFlags::EXHST) {
            break;
        }
        let mut carry = true;
        for row in mat.iter_mut().rev() {
            match row {
                Row::Zero => {
                    *row = Row::Unit;
                    carry = false;
                    break;
                }
                Row::Unit => {
                    *row = Row::Zero;
                }
                Row::Owned(_) => {}
            }
        }
        if carry {
            break;
        }
    }
}

/// Calculate XorOut from a known Init, check it against all the
/// arguments and record the model if consistent.
fn calout(
    results: &mut Vec<Model>,
    divisor: &Poly,
    init: &Poly,
    flags: ModelFlags,
    args: &[Poly],
    sink: &mut dyn Sink,
) {
    let arg = match args.iter().min_by_key(|p| p.len()) {
        Some(arg) => arg,
        None => return,
    };
    let mut xorout = arg.crc(divisor, init, &Poly::zero(), ModelFlags::empty());
    // in the Williams model the reflection stage intervenes between
    // Init and XorOut, so the register holds the mirror image
    if flags.contains(ModelFlags::REFOUT) {
        xorout.reverse();
    }
    chkres(results, divisor, init, flags, &xorout, args, sink);
}

/// Calculate Init from a known XorOut by running the reciprocal
/// algorithm over the reversed shortest argument.
fn calini(
    results: &mut Vec<Model>,
    divisor: &Poly,
    flags: ModelFlags,
    xorout: &Poly,
    args: &[Poly],
    sink: &mut dyn Sink,
) {
    let arg = match args.iter().min_by_key(|p| p.len()) {
        Some(arg) => arg,
        None => return,
    };
    let mut rcpdiv = divisor.clone();
    rcpdiv.reciprocal();
    let mut rxor = xorout.clone();
    if !flags.contains(ModelFlags::REFOUT) {
        rxor.reverse();
    }
    let mut rarg = arg.clone();
    rarg.reverse();
    let mut init = rarg.crc(&rcpdiv, &rxor, &Poly::zero(), ModelFlags::empty());
    init.reverse();
    chkres(results, divisor, &init, flags, xorout, args, sink);
}

/// Check a candidate model against every argument and record it on
/// success.
fn chkres(
    results: &mut Vec<Model>,
    divisor: &Poly,
    init: &Poly,
    flags: ModelFlags,
    xorout: &Poly,
    args: &[Poly],
    sink: &mut dyn Sink,
) {
    let mut xor = xorout.clone();
    if flags.contains(ModelFlags::REFOUT) {
        xor.reverse();
    }
    for arg in args {
        if !arg.crc(divisor, init, &xor, ModelFlags::empty()).is_zero() {
            return;
        }
    }
    let mut model = Model {
        spoly: divisor.clone(),
        init: init.clone(),
        xorout: xorout.clone(),
        flags,
        check: Poly::zero(),
        magic: Poly::zero(),
        name: None,
    };
    model.update_check();
    debug!("model confirmed: {}", model);
    results.push(model);
    if let Some(model) = results.last() {
        sink.found(model);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn flags_of(refin: bool, refout: bool) -> ModelFlags {
        let mut flags = ModelFlags::MULXN;
        flags.set(ModelFlags::REFIN, refin);
        flags.set(ModelFlags::REFOUT, refout);
        flags
    }

    // a sample in the engine's domain: the (possibly char-reflected)
    // message with the internal-sense CRC appended
    fn engine_sample(payload: &[u8], model: &Model) -> Poly {
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

    fn payloads(seed: u64, sizes: &[usize]) -> Vec<Vec<u8>> {
        let mut rng = StdRng::seed_from_u64(seed);
        sizes
            .iter()
            .map(|&n| (0..n).map(|_| rng.gen()).collect())
            .collect()
    }

    fn guess(width: usize, start: u128, flags: ModelFlags) -> Model {
        let mut m = Model::default();
        m.spoly = Poly::from_value(width, start);
        m.init = Poly::with_len(width);
        m.xorout = Poly::with_len(width);
        m.flags = flags;
        m
    }

    struct Collect {
        progress: Vec<u64>,
    }

    impl Sink for Collect {
        fn found(&mut self, _model: &Model) {}
        fn progress(&mut self, _factor: &Poly, _flags: ModelFlags, seq: u64) {
            self.progress.push(seq);
        }
    }

    fn params(results: &[Model]) -> Vec<(Poly, Poly, Poly)> {
        results
            .iter()
            .map(|m| (m.spoly.clone(), m.init.clone(), m.xorout.clone()))
            .collect()
    }

    #[test]
    fn known_poly_equal_length_samples() {
        // three 64-bit payloads under CRC-16/IBM-3740; equal lengths
        // force the zero-XorOut Init calculation
        let truth = Model::new(
            Poly::from_value(16, 0x1021),
            Poly::from_value(16, 0xffff),
            Poly::from_value(16, 0x0000),
            flags_of(false, false),
        );
        let args: Vec<Poly> = payloads(3, &[8, 8, 8])
            .iter()
            .map(|p| engine_sample(p, &truth))
            .collect();
        let g = guess(16, 0x1021, truth.flags);
        let results = reveng(
            &g,
            &Poly::zero(),
            SearchFlags::HAVEP | SearchFlags::HAVERI | SearchFlags::HAVERO,
            &args,
            &mut (),
        );
        assert_eq!(
            params(&results),
            vec![(
                Poly::from_value(16, 0x1021),
                Poly::from_value(16, 0xffff),
                Poly::from_value(16, 0x0000),
            )]
        );
    }

    #[test]
    fn engini_enumerates_inits() {
        // distinct lengths engage the linear-algebra recovery; the
        // reducible generator leaves a one-dimensional kernel, so the
        // exhaustive pass reports two consistent models
        let truth = Model::new(
            Poly::from_value(16, 0x1021),
            Poly::from_value(16, 0xffff),
            Poly::from_value(16, 0x0000),
            flags_of(false, false),
        );
        let args: Vec<Poly> = payloads(4, &[4, 6, 8, 9])
            .iter()
            .map(|p| engine_sample(p, &truth))
            .collect();
        let g = guess(16, 0x1021, truth.flags | ModelFlags::EXHST);
        let results = reveng(&g, &Poly::zero(), SearchFlags::HAVEP, &args, &mut ());
        assert_eq!(results.len(), 2);
        assert!(params(&results).contains(&(
            Poly::from_value(16, 0x1021),
            Poly::from_value(16, 0xffff),
            Poly::from_value(16, 0x0000),
        )));

        // without EXHST only the first solution is reported
        let g = guess(16, 0x1021, truth.flags);
        let first = reveng(&g, &Poly::zero(), SearchFlags::HAVEP, &args, &mut ());
        assert_eq!(first.len(), 1);
        assert_eq!(params(&first)[0], params(&results)[0]);
    }

    #[test]
    fn calini_from_known_xorout() {
        // CRC-16/IBM-SDLC with XorOut given
        let truth = Model::new(
            Poly::from_value(16, 0x1021),
            Poly::from_value(16, 0xffff),
            Poly::from_value(16, 0xffff),
            flags_of(true, true),
        );
        let args: Vec<Poly> = payloads(5, &[4, 6, 8, 9])
            .iter()
            .map(|p| engine_sample(p, &truth))
            .collect();
        let mut g = guess(16, 0x1021, truth.flags);
        g.xorout = Poly::from_value(16, 0xffff);
        let results = reveng(
            &g,
            &Poly::zero(),
            SearchFlags::HAVEP | SearchFlags::HAVEX,
            &args,
            &mut (),
        );
        assert_eq!(
            params(&results),
            vec![(
                Poly::from_value(16, 0x1021),
                Poly::from_value(16, 0xffff),
                Poly::from_value(16, 0xffff),
            )]
        );
    }

    #[test]
    fn calini_mirrors_unreflected_xorout() {
        // CRC-16/DECT-R is unreflected with an asymmetric XorOut, so
        // the mirroring applied to it before the reciprocal run is
        // observable; skipping it would fail the checker
        let truth = Model::new(
            Poly::from_value(16, 0x0589),
            Poly::from_value(16, 0x0000),
            Poly::from_value(16, 0x0001),
            flags_of(false, false),
        );
        let args: Vec<Poly> = payloads(13, &[4, 6, 8])
            .iter()
            .map(|p| engine_sample(p, &truth))
            .collect();
        let mut g = guess(16, 0x0589, truth.flags);
        g.xorout = Poly::from_value(16, 0x0001);
        let results = reveng(
            &g,
            &Poly::zero(),
            SearchFlags::HAVEP | SearchFlags::HAVEX,
            &args,
            &mut (),
        );
        assert_eq!(
            params(&results),
            vec![(
                Poly::from_value(16, 0x0589),
                Poly::from_value(16, 0x0000),
                Poly::from_value(16, 0x0001),
            )]
        );
    }

    #[test]
    fn calout_from_known_init() {
        let truth = Model::new(
            Poly::from_value(16, 0x1021),
            Poly::from_value(16, 0xffff),
            Poly::from_value(16, 0xffff),
            flags_of(true, true),
        );
        let args: Vec<Poly> = payloads(6, &[5, 7, 9])
            .iter()
            .map(|p| engine_sample(p, &truth))
            .collect();
        let mut g = guess(16, 0x1021, truth.flags);
        g.init = Poly::from_value(16, 0xffff);
        let results = reveng(
            &g,
            &Poly::zero(),
            SearchFlags::HAVEP | SearchFlags::HAVEI,
            &args,
            &mut (),
        );
        assert_eq!(
            params(&results),
            vec![(
                Poly::from_value(16, 0x1021),
                Poly::from_value(16, 0xffff),
                Poly::from_value(16, 0xffff),
            )]
        );
    }

    #[test]
    fn checker_rejects_wrong_init() {
        let truth = Model::new(
            Poly::from_value(16, 0x1021),
            Poly::from_value(16, 0xffff),
            Poly::from_value(16, 0x0000),
            flags_of(false, false),
        );
        let args: Vec<Poly> = payloads(7, &[6, 8])
            .iter()
            .map(|p| engine_sample(p, &truth))
            .collect();
        let mut g = guess(16, 0x1021, truth.flags);
        g.init = Poly::from_value(16, 0x1234);
        g.xorout = Poly::from_value(16, 0x0000);
        let have = SearchFlags::HAVEP | SearchFlags::HAVEI | SearchFlags::HAVEX;
        assert!(reveng(&g, &Poly::zero(), have, &args, &mut ()).is_empty());

        g.init = Poly::from_value(16, 0xffff);
        assert_eq!(reveng(&g, &Poly::zero(), have, &args, &mut ()).len(), 1);
    }

    #[test]
    fn brute_force_finds_arc() {
        // four samples under CRC-16/ARC, generator unknown
        let truth = Model::new(
            Poly::from_value(16, 0x8005),
            Poly::from_value(16, 0x0000),
            Poly::from_value(16, 0x0000),
            flags_of(true, true),
        );
        let args: Vec<Poly> = payloads(8, &[8, 8, 8, 8])
            .iter()
            .map(|p| engine_sample(p, &truth))
            .collect();
        let g = guess(16, 0, truth.flags);
        let results = reveng(&g, &Poly::zero(), SearchFlags::empty(), &args, &mut ());
        assert!(params(&results).contains(&(
            Poly::from_value(16, 0x8005),
            Poly::from_value(16, 0x0000),
            Poly::from_value(16, 0x0000),
        )));

        // a range end below the generator excludes it
        let bounded = reveng(
            &g,
            &Poly::from_value(16, 0x8000),
            SearchFlags::HAVEQ,
            &args,
            &mut (),
        );
        assert!(!bounded
            .iter()
            .any(|m| m.spoly == Poly::from_value(16, 0x8005)));
    }

    #[test]
    fn soundness_of_results() {
        // every reported model must reproduce every argument
        let truth = Model::new(
            Poly::from_value(16, 0x8005),
            Poly::from_value(16, 0x0000),
            Poly::from_value(16, 0x0000),
            flags_of(true, true),
        );
        let args: Vec<Poly> = payloads(9, &[6, 6])
            .iter()
            .map(|p| engine_sample(p, &truth))
            .collect();
        let g = guess(16, 0, truth.flags);
        let mut sink = Collect { progress: Vec::new() };
        let results = reveng(&g, &Poly::zero(), SearchFlags::empty(), &args, &mut sink);
        assert!(!results.is_empty());
        for model in &results {
            let mut xor = model.xorout.clone();
            if model.flags.contains(ModelFlags::REFOUT) {
                xor.reverse();
            }
            for arg in &args {
                assert!(arg
                    .crc(&model.spoly, &model.init, &xor, ModelFlags::empty())
                    .is_zero());
            }
        }
        // progress sequence numbers count up from zero
        assert!(sink
            .progress
            .iter()
            .enumerate()
            .all(|(i, &seq)| seq == i as u64));
    }

    #[test]
    fn insufficient_information_is_empty() {
        let truth = Model::new(
            Poly::from_value(16, 0x8005),
            Poly::from_value(16, 0x0000),
            Poly::from_value(16, 0x0000),
            flags_of(true, true),
        );
        let sample = engine_sample(&payloads(10, &[4])[0], &truth);
        let g = guess(16, 0, truth.flags);

        // one sample, or identical samples, difference away to nothing
        assert!(reveng(&g, &Poly::zero(), SearchFlags::empty(), &[sample.clone()], &mut ()).is_empty());
        let twins = [sample.clone(), sample];
        assert!(reveng(&g, &Poly::zero(), SearchFlags::empty(), &twins, &mut ()).is_empty());

        // no width, no search
        let empty = Model::default();
        assert!(reveng(&empty, &Poly::zero(), SearchFlags::empty(), &twins, &mut ()).is_empty());
        assert!(reveng(&empty, &Poly::zero(), SearchFlags::HAVEP, &twins, &mut ()).is_empty());
    }

    #[test]
    fn short_gcd_recovers_cofactor() {
        // two one-byte samples under CRC-8/SMBUS whose difference
        // spans twelve bits: the trial factors are three bits wide
        // and the generator is recovered as a cofactor
        let truth = Model::new(
            Poly::from_value(8, 0x07),
            Poly::from_value(8, 0x00),
            Poly::from_value(8, 0x00),
            flags_of(false, false),
        );
        let args = [
            engine_sample(&[0x00], &truth),
            engine_sample(&[0x09], &truth),
        ];
        let g = guess(8, 0, truth.flags);
        let mut sink = Collect { progress: Vec::new() };
        let results = reveng(&g, &Poly::zero(), SearchFlags::empty(), &args, &mut sink);
        assert_eq!(
            params(&results),
            vec![(
                Poly::from_value(8, 0x07),
                Poly::from_value(8, 0x00),
                Poly::from_value(8, 0x00),
            )]
        );
        // the factor loop ran and reported from sequence number zero
        assert_eq!(sink.progress, vec![0]);

        // a range end beyond the truncated space falls back to
        // stopping when the factor iteration rolls over
        let results = reveng(
            &g,
            &Poly::from_value(8, 0xff),
            SearchFlags::HAVEQ,
            &args,
            &mut (),
        );
        assert!(params(&results).contains(&(
            Poly::from_value(8, 0x07),
            Poly::from_value(8, 0x00),
            Poly::from_value(8, 0x00),
        )));

        // a start polynomial beyond the truncated space searches
        // nothing
        let g = guess(8, 0xff, truth.flags);
        assert!(reveng(&g, &Poly::zero(), SearchFlags::empty(), &args, &mut ()).is_empty());
    }

    #[test]
    fn results_are_deterministic() {
        let truth = Model::new(
            Poly::from_value(16, 0x8005),
            Poly::from_value(16, 0x0000),
            Poly::from_value(16, 0x0000),
            flags_of(true, true),
        );
        let args: Vec<Poly> = payloads(11, &[5, 5])
            .iter()
            .map(|p| engine_sample(p, &truth))
            .collect();
        let g = guess(16, 0, truth.flags);
        let first = reveng(&g, &Poly::zero(), SearchFlags::empty(), &args, &mut ());
        let second = reveng(&g, &Poly::zero(), SearchFlags::empty(), &args, &mut ());
        assert_eq!(first, second);
    }

    #[test]
    fn gcd_of_differences_cancels_init() {
        // with Init known, unequal lengths contribute differences too
        let truth = Model::new(
            Poly::from_value(16, 0x1021),
            Poly::from_value(16, 0xffff),
            Poly::from_value(16, 0x0000),
            flags_of(false, false),
        );
        let args: Vec<Poly> = payloads(12, &[4, 6])
            .iter()
            .map(|p| engine_sample(p, &truth))
            .collect();

        let none = gcd_of_differences(
            &Poly::from_value(16, 0xffff),
            SearchFlags::empty(),
            &args,
        );
        assert!(none.is_empty());

        let gcd = gcd_of_differences(
            &Poly::from_value(16, 0xffff),
            SearchFlags::HAVEI,
            &args,
        );
        // the difference is a multiple of the generator
        assert!(gcd.len() >= 17);
        let rem = gcd.crc(
            &Poly::from_value(16, 0x1021),
            &Poly::zero(),
            &Poly::zero(),
            ModelFlags::empty(),
        );
        assert!(rem.is_zero());
    }
}
