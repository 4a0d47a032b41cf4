use std::fmt;

use crate::Symbols;
use crate::types::Type;

const FITS: u8 = 0b0001;
const CONVERTS: u8 = 0b0010;
const PACKS: u8 = 0b0100;
const UNPACKS: u8 = 0b1000;

/// Describes how a set of produced types satisfies a set of required types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeFit {
    NoFit = 0,
    ConvPackUnpack = FITS | CONVERTS | PACKS | UNPACKS,
    ConvPack = FITS | CONVERTS | PACKS,
    ConvUnpack = FITS | CONVERTS | UNPACKS,
    Conv = FITS | CONVERTS,
    PackUnpack = FITS | PACKS | UNPACKS,
    Pack = FITS | PACKS,
    Unpack = FITS | UNPACKS,
    Fit = FITS,
}

impl TypeFit {
    fn from_flags(flags: u8) -> Self {
        if flags & FITS == 0 {
            return Self::NoFit;
        }
        match flags & (CONVERTS | PACKS | UNPACKS) {
            0 => Self::Fit,
            CONVERTS => Self::Conv,
            PACKS => Self::Pack,
            UNPACKS => Self::Unpack,
            0b0110 => Self::ConvPack,
            0b1010 => Self::ConvUnpack,
            0b1100 => Self::PackUnpack,
            _ => Self::ConvPackUnpack,
        }
    }

    #[inline]
    fn flags(self) -> u8 {
        self as u8
    }

    /// The position of this fit in the total order, from worst to best.
    fn ordinal(self) -> u8 {
        match self {
            Self::NoFit => 0,
            Self::ConvPackUnpack => 1,
            Self::ConvPack => 2,
            Self::ConvUnpack => 3,
            Self::Conv => 4,
            Self::PackUnpack => 5,
            Self::Pack => 6,
            Self::Unpack => 7,
            Self::Fit => 8,
        }
    }

    #[inline]
    pub fn fits(self) -> bool {
        self.flags() & FITS != 0
    }

    #[inline]
    pub fn converts(self) -> bool {
        self.flags() & CONVERTS != 0
    }

    #[inline]
    pub fn packs(self) -> bool {
        self.flags() & PACKS != 0
    }

    #[inline]
    pub fn unpacks(self) -> bool {
        self.flags() & UNPACKS != 0
    }

    #[inline]
    pub fn better_than(self, other: Self) -> bool {
        self.ordinal() > other.ordinal()
    }

    /// Merges two fits. The result fits only if both sides do.
    pub fn combine(self, other: Self) -> Self {
        if self.fits() && other.fits() {
            Self::from_flags(self.flags() | other.flags())
        } else {
            Self::NoFit
        }
    }

    #[inline]
    pub fn add_conversion(self) -> Self {
        self.add(CONVERTS)
    }

    #[inline]
    pub fn add_pack(self) -> Self {
        self.add(PACKS)
    }

    #[inline]
    pub fn add_unpack(self) -> Self {
        self.add(UNPACKS)
    }

    #[inline]
    pub fn remove_conversion(self) -> Self {
        Self::from_flags(self.flags() & !CONVERTS)
    }

    #[inline]
    pub fn remove_pack(self) -> Self {
        Self::from_flags(self.flags() & !PACKS)
    }

    #[inline]
    pub fn remove_unpack(self) -> Self {
        Self::from_flags(self.flags() & !UNPACKS)
    }

    fn add(self, flag: u8) -> Self {
        if self.fits() {
            Self::from_flags(self.flags() | flag)
        } else {
            self
        }
    }
}

impl fmt::Display for TypeFit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoFit => "no fit",
            Self::ConvPackUnpack => "fit with conversion, packing and unpacking",
            Self::ConvPack => "fit with conversion and packing",
            Self::ConvUnpack => "fit with conversion and unpacking",
            Self::Conv => "fit with conversion",
            Self::PackUnpack => "fit with packing and unpacking",
            Self::Pack => "fit with packing",
            Self::Unpack => "fit with unpacking",
            Self::Fit => "fit",
        };
        f.write_str(name)
    }
}

pub fn calc_fit(symbols: &Symbols, input: Option<&Type>, output: Option<&Type>) -> TypeFit {
    let Some(input) = input else {
        return TypeFit::NoFit;
    };
    let Some(output) = output else {
        return TypeFit::Fit;
    };
    if symbols.is_a(input, output) {
        TypeFit::Fit
    } else if symbols.find_conversion(input, output).is_some() {
        TypeFit::Conv
    } else {
        TypeFit::NoFit
    }
}

pub fn calc_fit_multi(symbols: &Symbols, inputs: &[Type], outputs: &[Type]) -> TypeFit {
    if inputs.len() < outputs.len() {
        return TypeFit::NoFit;
    }
    match (inputs, outputs) {
        ([input], [] | [_]) => return calc_fit(symbols, Some(input), outputs.first()),
        (_, [output]) => {
            if let Some(elems) = output.tuple_elements().filter(|e| e.len() <= inputs.len()) {
                let packed = fold_fits(symbols, inputs, elems);
                if packed.fits() {
                    return packed.add_pack();
                }
            }
        }
        _ => {}
    }
    fold_fits(symbols, inputs, outputs)
}

fn fold_fits(symbols: &Symbols, inputs: &[Type], outputs: &[Type]) -> TypeFit {
    outputs
        .iter()
        .zip(inputs)
        .try_fold(TypeFit::Fit, |acc, (output, input)| {
            let fit = calc_fit(symbols, Some(input), Some(output));
            fit.fits().then(|| acc.combine(fit))
        })
        .unwrap_or(TypeFit::NoFit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::predef;

    const ALL: [TypeFit; 9] = [
        TypeFit::NoFit,
        TypeFit::ConvPackUnpack,
        TypeFit::ConvPack,
        TypeFit::ConvUnpack,
        TypeFit::Conv,
        TypeFit::PackUnpack,
        TypeFit::Pack,
        TypeFit::Unpack,
        TypeFit::Fit,
    ];

    #[test]
    fn order_is_total_from_worst_to_best() {
        for pair in ALL.windows(2) {
            assert!(pair[1].better_than(pair[0]), "{} > {}", pair[1], pair[0]);
        }
        assert!(!TypeFit::Fit.better_than(TypeFit::Fit));
    }

    #[test]
    fn combine_is_associative_and_commutative() {
        for a in ALL {
            for b in ALL {
                assert_eq!(a.combine(b), b.combine(a));
                for c in ALL {
                    assert_eq!(a.combine(b).combine(c), a.combine(b.combine(c)));
                }
                if a == TypeFit::NoFit || b == TypeFit::NoFit {
                    assert_eq!(a.combine(b), TypeFit::NoFit);
                }
            }
        }
        assert_eq!(TypeFit::Conv.combine(TypeFit::Pack), TypeFit::ConvPack);
        assert_eq!(TypeFit::Unpack.combine(TypeFit::Conv), TypeFit::ConvUnpack);
    }

    #[test]
    fn upgrades_leave_no_fit_alone() {
        assert_eq!(TypeFit::NoFit.add_conversion(), TypeFit::NoFit);
        assert_eq!(TypeFit::NoFit.add_pack(), TypeFit::NoFit);
        assert_eq!(TypeFit::NoFit.add_unpack(), TypeFit::NoFit);
        assert_eq!(TypeFit::Fit.add_pack().add_unpack(), TypeFit::PackUnpack);

        assert_eq!(TypeFit::ConvPackUnpack.remove_unpack(), TypeFit::ConvPack);
        assert_eq!(TypeFit::ConvPackUnpack.remove_pack(), TypeFit::ConvUnpack);
        assert_eq!(TypeFit::ConvPack.remove_conversion(), TypeFit::Pack);
        assert_eq!(TypeFit::Conv.remove_conversion(), TypeFit::Fit);
    }

    #[test]
    fn calc_fit_is_reflexive_and_monotone() {
        let symbols = Symbols::with_default_types();
        let types = [
            Type::int(),
            Type::boolean(),
            Type::object(),
            Type::nullable(Type::int()),
            Type::tuple([Type::int(), Type::boolean()]),
            Type::app(predef::ARRAY, [Type::int()]),
        ];
        for a in &types {
            assert!(calc_fit(&symbols, Some(a), Some(a)).fits());
            for b in &types {
                if symbols.is_a(a, b) {
                    assert_eq!(calc_fit(&symbols, Some(a), Some(b)), TypeFit::Fit);
                }
            }
        }
        assert_eq!(calc_fit(&symbols, None, Some(&Type::int())), TypeFit::NoFit);
        assert_eq!(calc_fit(&symbols, Some(&Type::int()), None), TypeFit::Fit);
        assert_eq!(
            calc_fit(&symbols, Some(&Type::int()), Some(&Type::nullary(predef::FLOAT))),
            TypeFit::Conv
        );
    }

    #[test]
    fn multiple_values_pack_into_a_tuple() {
        let symbols = Symbols::with_default_types();
        let float = Type::nullary(predef::FLOAT);
        let ints = [Type::int(), Type::int()];

        assert_eq!(
            calc_fit_multi(&symbols, &ints, &[Type::tuple([Type::int(), Type::int()])]),
            TypeFit::Pack
        );
        assert_eq!(
            calc_fit_multi(&symbols, &ints, &[Type::tuple([Type::int(), float.clone()])]),
            TypeFit::ConvPack
        );
        assert_eq!(calc_fit_multi(&symbols, &ints, &[Type::int(), float]), TypeFit::Conv);
        assert_eq!(calc_fit_multi(&symbols, &[Type::int()], &ints), TypeFit::NoFit);
        assert_eq!(calc_fit_multi(&symbols, &ints, &[]), TypeFit::Fit);
    }

    #[test]
    fn leading_tuple_fits_without_packing() {
        let symbols = Symbols::with_default_types();
        let pair = Type::tuple([Type::int(), Type::int()]);

        assert_eq!(
            calc_fit_multi(&symbols, &[pair.clone(), Type::int()], &[pair]),
            TypeFit::Fit
        );
    }
}
