//! Strategy 1: delete one uniformly random line.
//!
//! Lines carrying identity, provenance, license, or hash fields are never
//! deleted; removing those either breaks unrelated invariants or produces
//! a trivially predictable "required field" error. The check is a raw
//! substring match against the line text, so a marker inside an unrelated
//! string literal also protects its line.

use rand::Rng;

use crate::MutateError;

/// Markers that make a line ineligible for deletion.
pub const PROTECTED_MARKERS: &[&str] = &[
    " hash = ",
    " name = ",
    " pname = ",
    " version = ",
    " src = ",
    " owner = ",
    " repo = ",
    " tag = ",
    " rev = ",
    " doCheck = ",
    " meta = ",
    " description = ",
    " homepage = ",
    " license = ",
    " maintainers = ",
];

/// Random draws before giving up on a recipe.
const MAX_ATTEMPTS: usize = 500;

fn is_protected(line: &str) -> bool {
    PROTECTED_MARKERS.iter().any(|marker| line.contains(marker))
}

/// Delete the first randomly drawn line that carries no protected marker.
///
/// Splits on `\n` rather than line iteration so trailing blank lines keep
/// their position in the rejoined text.
pub(crate) fn execute<R: Rng>(source: &str, rng: &mut R) -> Result<String, MutateError> {
    let lines: Vec<&str> = source.split('\n').collect();
    for _ in 0..MAX_ATTEMPTS {
        let index = rng.gen_range(0..lines.len());
        if is_protected(lines[index]) {
            continue;
        }
        let mut kept = lines.clone();
        kept.remove(index);
        return Ok(kept.join("\n"));
    }
    Err(MutateError::NoMutationFound {
        attempts: MAX_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const RECIPE: &str = "\
{ lib, stdenv }:\n\
stdenv.mkDerivation {\n\
  pname = \"demo\";\n\
  version = \"1.0\";\n\
  src = ./.;\n\
  # build with defaults\n\
  buildInputs = [ ];\n\
  meta = { };\n\
}\n";

    #[test]
    fn test_never_deletes_protected_lines() {
        for seed in 0..64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mutated = execute(RECIPE, &mut rng).unwrap();

            let before: Vec<&str> = RECIPE.split('\n').collect();
            let after: Vec<&str> = mutated.split('\n').collect();
            assert_eq!(after.len(), before.len() - 1);

            // The first position where the texts diverge is the deleted line.
            let mut index = 0;
            while index < after.len() && before[index] == after[index] {
                index += 1;
            }
            let deleted = before[index];
            assert!(
                !is_protected(deleted),
                "seed {seed} deleted protected line: {deleted:?}"
            );
        }
    }

    #[test]
    fn test_fails_when_every_line_is_protected() {
        let source = "  pname = \"x\";\n  version = \"1\";";
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            execute(source, &mut rng),
            Err(MutateError::NoMutationFound { attempts: 500 })
        );
    }

    #[test]
    fn test_preserves_trailing_blank_lines() {
        let source = "keep\ndelete-me\n\n";
        // Force deletion of a middle line by retrying seeds until the
        // mutated text still ends with the two trailing separators.
        let mut found = false;
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mutated = execute(source, &mut rng).unwrap();
            if mutated == "keep\n\n" {
                found = true;
                break;
            }
        }
        assert!(found, "no seed deleted the middle line");
    }

    #[test]
    fn test_marker_inside_literal_still_protects() {
        let source = "ok\ndescription = \"x\"\npatch = \" meta = \";";
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mutated = execute(source, &mut rng).unwrap();
            assert!(mutated.contains(" meta = "));
        }
    }
}
