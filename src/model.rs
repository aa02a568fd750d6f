use core::fmt;

use crate::poly::Poly;

bitflags::bitflags! {
    /// Behaviour and formatting flags of a Williams model.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModelFlags: u32 {
        /// Input characters are reflected before processing.
        const REFIN  = 1 << 0;
        /// The final register is reflected before XorOut.
        const REFOUT = 1 << 1;
        /// The message is implicitly multiplied by `x^width`
        /// (the augmenting form of the division).
        const MULXN  = 1 << 2;
        /// Right-justify formatted output.
        const RTJUST = 1 << 3;
        /// Separate formatted characters with spaces.
        const SPACE  = 1 << 4;
        /// Uppercase hexadecimal output.
        const UPPER  = 1 << 5;
        /// Arguments are raw binary, not hexadecimal text.
        const DIRECT = 1 << 6;
        /// Low bytes first within file characters.
        const LTLBYT = 1 << 7;
        /// Exhaustively enumerate equivalent forms.
        const EXHST  = 1 << 8;
    }
}

/// The standard check-value message.
pub const CHECK_STRING: &[u8] = b"123456789";

// asymmetric bytes that tell the reflection senses apart
const SENSE_PROBE: &[u8] = &[0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];

/// A CRC algorithm in the Williams parameter model.
///
/// The generator is stored without its top `x^width` term, so the
/// width of the model is `spoly.len()`. `check` is the CRC of the
/// ASCII string `"123456789"` and `magic` holds the residue; both are
/// recomputed whenever the model is finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub spoly: Poly,
    pub init: Poly,
    pub xorout: Poly,
    pub flags: ModelFlags,
    pub check: Poly,
    pub magic: Poly,
    pub name: Option<String>,
}

impl Default for Model {
    fn default() -> Model {
        Model {
            spoly: Poly::zero(),
            init: Poly::zero(),
            xorout: Poly::zero(),
            flags: ModelFlags::MULXN,
            check: Poly::zero(),
            magic: Poly::zero(),
            name: None,
        }
    }
}

impl Model {
    /// Build a model from its parameters and compute its check value.
    pub fn new(spoly: Poly, init: Poly, xorout: Poly, flags: ModelFlags) -> Model {
        let mut model = Model {
            spoly,
            init,
            xorout,
            flags,
            check: Poly::zero(),
            magic: Poly::zero(),
            name: None,
        };
        model.update_check();
        model
    }

    /// The CRC width in bits.
    #[inline]
    pub fn width(&self) -> usize {
        self.spoly.len()
    }

    /// The CRC of `bytes` under this model, in the output
    /// presentation.
    pub fn checksum(&self, bytes: &[u8]) -> Poly {
        let mut msg = Poly::from_bytes(bytes);
        if self.flags.contains(ModelFlags::REFIN) {
            msg.reflect_chars(8);
        }
        let mut crc = msg.crc(
            &self.spoly,
            &self.init,
            &Poly::zero(),
            self.flags & ModelFlags::MULXN,
        );
        if self.flags.contains(ModelFlags::REFOUT) {
            crc.reverse();
        }
        if !self.xorout.is_empty() {
            let mut x = self.xorout.clone();
            x.right(crc.len());
            crc.xor_at(&x, 0);
        }
        crc
    }

    /// Recompute `check` and `magic` from the parameters.
    ///
    /// The check value is the CRC of `"123456789"`; the residue is the
    /// register value left by an error-free codeword, presented in the
    /// output sense.
    pub fn update_check(&mut self) {
        self.check = self.checksum(CHECK_STRING);

        let mut x = self.xorout.clone();
        if self.flags.contains(ModelFlags::REFOUT) {
            x.reverse();
        }
        let mut residue = x.crc(&self.spoly, &Poly::zero(), &Poly::zero(), ModelFlags::MULXN);
        if self.flags.contains(ModelFlags::REFOUT) {
            residue.reverse();
        }
        self.magic = residue;
    }

    /// Put the model into canonical form.
    ///
    /// Init and XorOut are right-aligned to the width (cleared when
    /// the generator is empty), and unless [`ModelFlags::EXHST`] is
    /// set, redundant reflection senses collapse to the smallest
    /// equivalent pair. The check value is recomputed.
    pub fn canon(&mut self) {
        let width = self.spoly.len();
        self.init.right(width);
        self.xorout.right(width);
        self.update_check();
        if self.flags.contains(ModelFlags::EXHST) || width == 0 {
            return;
        }
        // a check collision alone can pick a wrong sense at small
        // widths, so a variant must also agree on a probe message
        let probe = self.checksum(SENSE_PROBE);
        for &(refin, refout) in &[(false, false), (false, true), (true, false), (true, true)] {
            let mut variant = self.clone();
            variant.flags.set(ModelFlags::REFIN, refin);
            variant.flags.set(ModelFlags::REFOUT, refout);
            variant.update_check();
            if variant.check == self.check && variant.checksum(SENSE_PROBE) == probe {
                self.flags = variant.flags;
                self.magic = variant.magic;
                break;
            }
        }
    }

    /// Reverse the model into its opposite-endian form.
    ///
    /// The generator becomes its reciprocal, both reflection senses
    /// flip, and whichever of Init and XorOut follows the reflection
    /// stage is mirrored. Any preset name no longer applies.
    pub fn reverse(&mut self) {
        self.spoly.reciprocal();
        if self.flags.contains(ModelFlags::REFOUT) {
            self.init.reverse();
        } else {
            self.xorout.reverse();
        }
        self.flags.toggle(ModelFlags::REFIN | ModelFlags::REFOUT);
        self.novel();
        self.update_check();
    }

    /// Detach the model from any preset it was derived from.
    #[inline]
    pub fn novel(&mut self) {
        self.name = None;
    }
}

impl fmt::Display for Model {
    /// The catalogue one-line form:
    /// `width=16 poly=0x1021 init=0xffff refin=false refout=false
    /// xorout=0x0000 check=0x29b1 residue=0x0000 name="..."`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = ModelFlags::RTJUST | (self.flags & ModelFlags::UPPER);
        write!(
            f,
            "width={} poly=0x{} init=0x{} refin={} refout={} xorout=0x{} check=0x{} residue=0x{}",
            self.spoly.len(),
            self.spoly.to_text(digits, 4),
            self.init.to_text(digits, 4),
            self.flags.contains(ModelFlags::REFIN),
            self.flags.contains(ModelFlags::REFOUT),
            self.xorout.to_text(digits, 4),
            self.check.to_text(digits, 4),
            self.magic.to_text(digits, 4),
        )?;
        match &self.name {
            Some(name) => write!(f, " name=\"{}\"", name),
            None => write!(f, " name=(none)"),
        }
    }
}
