/*! Isotopologue m/z targets and natural-abundance weights for identified peptides */
#[doc(hidden)]
pub use chemical_elements::isotopic_pattern::{
    BafflingRecursiveIsotopicPatternGenerator, TheoreticalIsotopicPattern,
};
use chemical_elements::{
    mass_charge_ratio as ion_mass_charge_ratio, ChemicalComposition, ElementSpecification,
    PERIODIC_TABLE, PROTON as _PROTON,
};
use mzdeisotope::isotopic_model::{IsotopicModel, IsotopicModels};

use tracing::trace;

use crate::error::{CompositionError, ExtractionError};
use crate::record::Composition;

/// The mass of H+, a hydrogen atom minus an electron
pub const PROTON: f64 = _PROTON;

/// The mass difference between carbon-13 and carbon-12
pub const NEUTRON_SHIFT: f64 = 1.0033548378;

/// The mass difference between deuterium and protium
pub const DEUTERIUM_SHIFT: f64 = 1.0062767458;

const WATER: [i32; 5] = [0, 2, 0, 1, 0];

const ELEMENTS: [&str; 5] = ["C", "H", "N", "O", "S"];

/// Residue compositions as C, H, N, O, S counts
const RESIDUES: [(char, [i32; 5]); 20] = [
    ('G', [2, 3, 1, 1, 0]),
    ('A', [3, 5, 1, 1, 0]),
    ('S', [3, 5, 1, 2, 0]),
    ('P', [5, 7, 1, 1, 0]),
    ('V', [5, 9, 1, 1, 0]),
    ('T', [4, 7, 1, 2, 0]),
    ('C', [3, 5, 1, 1, 1]),
    ('L', [6, 11, 1, 1, 0]),
    ('I', [6, 11, 1, 1, 0]),
    ('N', [4, 6, 2, 2, 0]),
    ('D', [4, 5, 1, 3, 0]),
    ('Q', [5, 8, 2, 2, 0]),
    ('K', [6, 12, 2, 1, 0]),
    ('E', [5, 7, 1, 3, 0]),
    ('M', [5, 9, 1, 1, 1]),
    ('H', [6, 7, 3, 1, 0]),
    ('F', [9, 9, 1, 1, 0]),
    ('R', [6, 12, 4, 1, 0]),
    ('Y', [9, 9, 1, 2, 0]),
    ('W', [11, 10, 2, 1, 0]),
];

fn residue_composition(residue: char) -> Option<&'static [i32; 5]> {
    RESIDUES
        .iter()
        .find(|(r, _)| *r == residue)
        .map(|(_, counts)| counts)
}

/// The mass spacing between consecutive isotopologues
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum LabelSpacing {
    /// Spacing by the carbon-13 neutron shift
    #[default]
    Carbon13,
    /// Spacing by the deuterium mass defect, for heavy water labeling
    Deuterium,
}

impl LabelSpacing {
    pub const fn shift(&self) -> f64 {
        match self {
            Self::Carbon13 => NEUTRON_SHIFT,
            Self::Deuterium => DEUTERIUM_SHIFT,
        }
    }
}

/// The m/z spacing between isotopologues of an ion with charge `charge`
#[inline]
pub fn isotopic_shift(charge: i32) -> f64 {
    NEUTRON_SHIFT / charge as f64
}

/// Convert a neutral mass into the m/z of its protonated ion
#[inline]
pub fn mass_charge_ratio(neutral_mass: f64, charge: i32) -> f64 {
    ion_mass_charge_ratio(neutral_mass, charge, PROTON)
}

/// The theoretical description of a single isotopologue
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IsotopologueSpec {
    /// The isotopologue's number of extra neutrons, 0 being monoisotopic
    pub index: usize,
    /// The m/z shift from the monoisotopic peak
    pub mz_offset: f64,
    pub mz: f64,
    /// The expected natural-abundance fraction among the tracked isotopologues
    pub weight: f64,
}

type LabeledTerm = (ElementSpecification<'static>, i32);

/// Check every element symbol in `formula` against the periodic table and pull out the
/// isotope-labeled terms like `C[13]6`, returning the unlabeled remainder and the labeled terms.
///
/// [`chemical_elements::parse_formula`] panics on unknown symbols and on isotope labels, so
/// neither may reach it.
fn split_labeled_terms(formula: &str) -> Result<(String, Vec<LabeledTerm>), CompositionError> {
    let malformed = |reason: String| CompositionError::MalformedFormula {
        formula: formula.to_string(),
        reason,
    };

    let chars: Vec<char> = formula.chars().collect();
    let mut remainder = String::with_capacity(formula.len());
    let mut labeled = Vec::new();
    let mut depth = 0i32;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(malformed(format!("Unbalanced ')' at {i}")));
                }
            }
            c if c.is_ascii_digit() => {}
            c if c.is_ascii_uppercase() => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_lowercase() {
                    i += 1;
                }
                let symbol: String = chars[start..i].iter().collect();
                let element = PERIODIC_TABLE
                    .get(&symbol)
                    .ok_or_else(|| malformed(format!("Unknown element {symbol}")))?;
                if chars.get(i) != Some(&'[') {
                    remainder.push_str(&symbol);
                    continue;
                }
                if depth > 0 {
                    return Err(malformed(format!(
                        "Isotope label on {symbol} inside a group"
                    )));
                }
                let close = chars[i..]
                    .iter()
                    .position(|c| *c == ']')
                    .ok_or_else(|| malformed(format!("Unclosed isotope number for {symbol}")))?;
                let number: String = chars[i + 1..i + close].iter().collect();
                let isotope = number
                    .parse::<u16>()
                    .ok()
                    .filter(|n| element.isotopes.contains_key(n))
                    .ok_or_else(|| malformed(format!("Unknown isotope {symbol}[{number}]")))?;
                i += close + 1;
                let count_start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let count = if count_start == i {
                    1
                } else {
                    let token: String = chars[count_start..i].iter().collect();
                    token
                        .parse::<i32>()
                        .map_err(|e| malformed(format!("Invalid count {token}: {e}")))?
                };
                labeled.push((ElementSpecification::new(element, isotope), count));
                continue;
            }
            c => return Err(malformed(format!("Unexpected character {c:?} at {i}"))),
        }
        remainder.push(c);
        i += 1;
    }
    Ok((remainder, labeled))
}

/// Parse an elemental formula like `C34H53N7O15`, `C2(CH2)3O` or `C[13]6C28H53N7O15`
pub fn parse_formula<'a>(formula: &str) -> Result<ChemicalComposition<'a>, CompositionError> {
    let formula = formula.trim();
    if formula.is_empty() {
        return Err(CompositionError::Empty);
    }
    let (remainder, labeled) = split_labeled_terms(formula)?;
    let mut composition = if remainder.is_empty() {
        ChemicalComposition::new()
    } else {
        chemical_elements::parse_formula(&remainder).map_err(|e| {
            CompositionError::MalformedFormula {
                formula: formula.to_string(),
                reason: e.to_string(),
            }
        })?
    };
    for (element, count) in labeled {
        composition.inc(element, count);
    }
    Ok(composition)
}

/// A peptide sequence reduced to its unmodified residue composition plus the mass of any
/// bracketed modifications
#[derive(Debug, Clone)]
pub struct PeptideComposition<'a> {
    pub composition: ChemicalComposition<'a>,
    pub modification_mass: f64,
}

impl PeptideComposition<'_> {
    pub fn neutral_mass(&self) -> f64 {
        self.composition.mass() + self.modification_mass
    }
}

/// Remove `X.` and `.X` flanking residue notation, e.g. `K.PEPTIDE.R` -> `PEPTIDE`
fn strip_flanking(sequence: &str) -> &str {
    let mut seq = sequence.trim();
    let bytes = seq.as_bytes();
    if bytes.len() > 2 && bytes[1] == b'.' && (bytes[0].is_ascii_alphabetic() || bytes[0] == b'-')
    {
        seq = &seq[2..];
    }
    let bytes = seq.as_bytes();
    let n = bytes.len();
    if n > 2
        && bytes[n - 2] == b'.'
        && (bytes[n - 1].is_ascii_alphabetic() || bytes[n - 1] == b'-')
    {
        seq = &seq[..n - 2];
    }
    seq
}

/// Convert a peptide sequence into its elemental composition using the standard residue
/// table. Bracketed mass shifts like `K[+8.0142]` or `M[15.9949]` are summed separately.
pub fn parse_peptide<'a>(sequence: &str) -> Result<PeptideComposition<'a>, CompositionError> {
    let core = strip_flanking(sequence);
    let mut counts = WATER;
    let mut modification_mass = 0.0;
    let mut n_residues = 0usize;

    let mut chars = core.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == '[' {
            let close = core[i..].find(']').ok_or_else(|| {
                CompositionError::MalformedModification {
                    modification: core[i..].to_string(),
                    sequence: sequence.to_string(),
                }
            })?;
            let token = &core[i + 1..i + close];
            let delta: f64 = token.trim_start_matches('+').parse().map_err(|_| {
                CompositionError::MalformedModification {
                    modification: token.to_string(),
                    sequence: sequence.to_string(),
                }
            })?;
            modification_mass += delta;
            // Skip past the closing bracket
            for _ in 0..close {
                chars.next();
            }
        } else if let Some(residue) = residue_composition(c) {
            counts
                .iter_mut()
                .zip(residue.iter())
                .for_each(|(acc, n)| *acc += n);
            n_residues += 1;
        } else {
            return Err(CompositionError::UnknownResidue {
                residue: c,
                sequence: sequence.to_string(),
            });
        }
    }
    if n_residues == 0 {
        return Err(CompositionError::Empty);
    }
    let formula: String = ELEMENTS
        .iter()
        .zip(counts)
        .filter(|(_, n)| *n > 0)
        .map(|(symbol, n)| format!("{symbol}{n}"))
        .collect();
    let composition = parse_formula(&formula)?;
    Ok(PeptideComposition {
        composition,
        modification_mass,
    })
}

/// Scale the peptide averagine to `neutral_mass`
pub fn averagine_composition<'a>(neutral_mass: f64) -> ChemicalComposition<'a> {
    let model: IsotopicModel<'static> = IsotopicModels::Peptide.into();
    model.scale(mass_charge_ratio(neutral_mass, 1), 1, PROTON)
}

/// The natural-abundance distribution of the first `n` isotopologues of `composition`,
/// normalized to sum to 1. Isotopologues beyond the end of the generated pattern weigh 0.
pub fn isotopic_weights(composition: ChemicalComposition<'_>, charge: i32, n: usize) -> Vec<f64> {
    let mut generator = BafflingRecursiveIsotopicPatternGenerator::new();
    let peaks = generator.isotopic_variants(composition, 0, charge, PROTON);
    let pattern = TheoreticalIsotopicPattern::from(peaks);
    let mut weights: Vec<f64> = pattern
        .iter()
        .take(n)
        .map(|p| p.intensity() as f64)
        .collect();
    weights.resize(n, 0.0);
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        weights.iter_mut().for_each(|w| *w /= total);
    }
    weights
}

/// A neutral monoisotopic mass, with the elemental composition when one is known
#[derive(Debug, Clone)]
pub struct ResolvedComposition<'a> {
    pub neutral_mass: f64,
    pub composition: Option<ChemicalComposition<'a>>,
}

impl<'a> ResolvedComposition<'a> {
    pub fn resolve(composition: &Composition) -> Result<Self, CompositionError> {
        let this = match composition {
            Composition::Formula(formula) => {
                let composition = parse_formula(formula)?;
                Self {
                    neutral_mass: composition.mass(),
                    composition: Some(composition),
                }
            }
            Composition::Mass(mass) => Self {
                neutral_mass: *mass,
                composition: None,
            },
            Composition::Peptide(sequence) => {
                let peptide = parse_peptide(sequence)?;
                Self {
                    neutral_mass: peptide.neutral_mass(),
                    composition: Some(peptide.composition),
                }
            }
        };
        if !this.neutral_mass.is_finite() || this.neutral_mass <= 0.0 {
            return Err(CompositionError::InvalidMass(this.neutral_mass));
        }
        Ok(this)
    }

    /// The elemental composition to draw isotopic weights from, falling back on an averagine
    /// scaled to the neutral mass
    pub fn weight_composition(&self) -> ChemicalComposition<'a> {
        match self.composition.as_ref() {
            Some(c) => c.clone(),
            None => averagine_composition(self.neutral_mass),
        }
    }
}

/// Derives the [`IsotopologueSpec`]s of identification records.
///
/// `isotopologue_count` is the highest isotopologue index tracked, so each record gets
/// `isotopologue_count + 1` specs.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IsotopeModel {
    pub isotopologue_count: usize,
    pub label_spacing: LabelSpacing,
}

impl Default for IsotopeModel {
    fn default() -> Self {
        Self {
            isotopologue_count: 5,
            label_spacing: LabelSpacing::Carbon13,
        }
    }
}

impl IsotopeModel {
    pub fn new(isotopologue_count: usize, label_spacing: LabelSpacing) -> Self {
        Self {
            isotopologue_count,
            label_spacing,
        }
    }

    /// The number of channels every MID vector carries
    pub fn channels(&self) -> usize {
        self.isotopologue_count + 1
    }

    /// The m/z spacing between isotopologues at `charge`
    pub fn spacing(&self, charge: i32) -> f64 {
        self.label_spacing.shift() / charge as f64
    }

    pub fn specs(
        &self,
        composition: &Composition,
        charge: i32,
    ) -> Result<Vec<IsotopologueSpec>, ExtractionError> {
        if charge <= 0 {
            return Err(ExtractionError::InvalidCharge(charge));
        }
        let resolved = ResolvedComposition::resolve(composition)?;
        let weights = isotopic_weights(resolved.weight_composition(), charge, self.channels());
        let base_mz = mass_charge_ratio(resolved.neutral_mass, charge);
        let spacing = self.spacing(charge);
        trace!(
            "Resolved {composition:?} to {} ({base_mz:0.4} m/z at {charge}+)",
            resolved.neutral_mass
        );
        let specs = weights
            .into_iter()
            .enumerate()
            .map(|(index, weight)| {
                let mz_offset = index as f64 * spacing;
                IsotopologueSpec {
                    index,
                    mz_offset,
                    mz: base_mz + mz_offset,
                    weight,
                }
            })
            .collect();
        Ok(specs)
    }
}

/// Compute the carbon-13 spaced specs of isotopologues `0..=k` for `composition` at `charge`
pub fn isotopologue_specs(
    composition: &Composition,
    charge: i32,
    k: usize,
) -> Result<Vec<IsotopologueSpec>, ExtractionError> {
    IsotopeModel::new(k, LabelSpacing::Carbon13).specs(composition, charge)
}
