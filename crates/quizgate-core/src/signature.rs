//! Structure signatures for detecting outdated final-exam passes.
//!
//! The signature is a 64-bit FNV-1a hash over the sorted required section
//! ids and the sorted micro-quiz ids, rendered as 16 lowercase hex digits.
//! It is only ever compared for equality.

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Separates ids within one list. ASCII unit separator never appears in ids.
const ID_SEPARATOR: u8 = 0x1f;
/// Separates the section list from the micro-quiz list.
const GROUP_SEPARATOR: u8 = 0x1e;

/// FNV-1a over a byte slice.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Compute the structure signature of a module.
///
/// Input order does not matter: both lists are sorted before hashing.
pub fn structure_signature<S: AsRef<str>>(required_sections: &[S], micro_quizzes: &[S]) -> String {
    let canonical = canonical_form(required_sections, micro_quizzes);
    format!("{:016x}", fnv1a(&canonical))
}

fn canonical_form<S: AsRef<str>>(required_sections: &[S], micro_quizzes: &[S]) -> Vec<u8> {
    let mut sections: Vec<&str> = required_sections.iter().map(AsRef::as_ref).collect();
    let mut quizzes: Vec<&str> = micro_quizzes.iter().map(AsRef::as_ref).collect();
    sections.sort_unstable();
    quizzes.sort_unstable();

    let mut out = Vec::new();
    push_joined(&mut out, &sections);
    out.push(GROUP_SEPARATOR);
    push_joined(&mut out, &quizzes);
    out
}

fn push_joined(out: &mut Vec<u8>, ids: &[&str]) {
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            out.push(ID_SEPARATOR);
        }
        out.extend_from_slice(id.as_bytes());
    }
}
