// Canonical FITREP vocabularies: trait letters, ranks, occasion codes
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trait grade column. A..G are observed marks, H is "not observed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TraitGrade {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
}

impl TraitGrade {
    pub const ALL: [TraitGrade; 8] = [
        TraitGrade::A,
        TraitGrade::B,
        TraitGrade::C,
        TraitGrade::D,
        TraitGrade::E,
        TraitGrade::F,
        TraitGrade::G,
        TraitGrade::H,
    ];

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(TraitGrade::A),
            'B' => Some(TraitGrade::B),
            'C' => Some(TraitGrade::C),
            'D' => Some(TraitGrade::D),
            'E' => Some(TraitGrade::E),
            'F' => Some(TraitGrade::F),
            'G' => Some(TraitGrade::G),
            'H' => Some(TraitGrade::H),
            _ => None,
        }
    }

    /// Strict parse: exactly one letter A-H, surrounding whitespace allowed.
    pub fn from_letter(s: &str) -> Option<Self> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            TraitGrade::A => 'A',
            TraitGrade::B => 'B',
            TraitGrade::C => 'C',
            TraitGrade::D => 'D',
            TraitGrade::E => 'E',
            TraitGrade::F => 'F',
            TraitGrade::G => 'G',
            TraitGrade::H => 'H',
        }
    }

    /// A=1 .. G=7; H has no numeric value.
    pub fn numeric(self) -> Option<u8> {
        match self {
            TraitGrade::H => None,
            other => Some(other as u8 + 1),
        }
    }

    pub fn is_observed(self) -> bool {
        self != TraitGrade::H
    }
}

impl fmt::Display for TraitGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

macro_rules! code_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $code)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn code(self) -> &'static str {
                match self {
                    $($name::$variant => $code),+
                }
            }

            /// Exact, case-insensitive lookup by code.
            pub fn from_code(code: &str) -> Option<Self> {
                let upper = code.trim().to_ascii_uppercase();
                Self::ALL.iter().copied().find(|v| v.code() == upper)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.code())
            }
        }
    };
}

code_enum! {
    /// Grade of the Marine, in the form's abbreviations.
    Rank {
        Sgt => "SGT",
        SSgt => "SSGT",
        GySgt => "GYSGT",
        MSgt => "MSGT",
        MGySgt => "MGYSGT",
        FirstSgt => "1STSGT",
        SgtMaj => "SGTMAJ",
        SecondLt => "2NDLT",
        FirstLt => "1STLT",
        Capt => "CAPT",
        Maj => "MAJ",
        LtCol => "LTCOL",
        Col => "COL",
        Wo => "WO",
        Cwo2 => "CWO2",
        Cwo3 => "CWO3",
        Cwo4 => "CWO4",
        Cwo5 => "CWO5",
        BGen => "BGEN",
        MajGen => "MAJGEN",
        LtGen => "LTGEN",
        Gen => "GEN",
    }
}

impl Rank {
    /// Seniority, 1 = most senior.
    pub fn seniority(self) -> u8 {
        match self {
            Rank::Gen => 1,
            Rank::LtGen => 2,
            Rank::MajGen => 3,
            Rank::BGen => 4,
            Rank::Col => 5,
            Rank::LtCol => 6,
            Rank::Maj => 7,
            Rank::Capt => 8,
            Rank::FirstLt => 9,
            Rank::SecondLt => 10,
            Rank::Cwo5 => 11,
            Rank::Cwo4 => 12,
            Rank::Cwo3 => 13,
            Rank::Cwo2 => 14,
            Rank::Wo => 15,
            Rank::SgtMaj => 16,
            Rank::FirstSgt => 17,
            Rank::MGySgt => 18,
            Rank::MSgt => 19,
            Rank::GySgt => 20,
            Rank::SSgt => 21,
            Rank::Sgt => 22,
        }
    }
}

code_enum! {
    /// Occasion that triggered the report.
    OccasionCode {
        GradeChange => "GC",
        DirectedByCmc => "DC",
        ChangeOfReportingSenior => "CH",
        Transfer => "TR",
        ChangeInDuty => "CD",
        ToTemporaryDuty => "TD",
        FromTemporaryDuty => "FD",
        EndOfService => "EN",
        ChangeInStatus => "CS",
        Annual => "AN",
        AnnualReserve => "AR",
        SemiAnnual => "SA",
        ReserveTraining => "RT",
    }
}
