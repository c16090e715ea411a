//! The mode-string mini-DSL (SPEC_FULL.md §4.F, §9): centralized as a pure
//! (save for the callback) procedure so it is unit-testable in isolation,
//! rather than interleaved with dispatch handlers.

use std::collections::HashSet;

use crate::error::Error;

/// Applied once per parameterized mode token, in encounter order, as
/// `(adding, mode_char, parameter)`.
pub type ParameterizedModeHandler<'a> = dyn FnMut(bool, char, &str) + 'a;

/// Apply a mode string like `+ov-o` against `current`, consuming entries
/// from `params` left-to-right for every mode character in
/// `parameterized_modes`. Non-parameterized modes are simply added to or
/// removed from `current`.
pub fn apply_modes(
    current: &mut HashSet<char>,
    mode_string: &str,
    params: &[String],
    parameterized_modes: &HashSet<char>,
    mut on_parameterized: impl FnMut(bool, char, &str),
) -> Result<(), Error> {
    let mut adding = true;
    let mut param_idx = 0;

    for c in mode_string.chars() {
        match c {
            '+' => adding = true,
            '-' => adding = false,
            c => {
                if parameterized_modes.contains(&c) {
                    let param = params.get(param_idx).ok_or_else(|| {
                        Error::ProtocolViolation(format!(
                            "not enough parameters for mode string {mode_string:?}"
                        ))
                    })?;
                    param_idx += 1;
                    on_parameterized(adding, c, param);
                } else if adding {
                    current.insert(c);
                } else {
                    current.remove(&c);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_mode_added_then_removed_is_a_no_op() {
        let mut modes = HashSet::new();
        apply_modes(&mut modes, "+o-o", &[], &HashSet::new(), |_, _, _| {}).unwrap();
        assert!(modes.is_empty());
    }

    #[test]
    fn sequential_applications_leave_the_expected_set() {
        let mut modes = HashSet::new();
        apply_modes(&mut modes, "+iw", &[], &HashSet::new(), |_, _, _| {}).unwrap();
        apply_modes(&mut modes, "-i", &[], &HashSet::new(), |_, _, _| {}).unwrap();
        assert_eq!(modes, HashSet::from(['w']));
    }

    #[test]
    fn parameterized_modes_invoke_the_callback_in_order() {
        let parameterized: HashSet<char> = HashSet::from(['o', 'v']);
        let params = vec!["alice".to_string(), "bob".to_string(), "alice".to_string()];
        let mut seen = Vec::new();
        let mut modes = HashSet::new();
        apply_modes(&mut modes, "+ov-o", &params, &parameterized, |add, m, p| {
            seen.push((add, m, p.to_string()));
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![
                (true, 'o', "alice".to_string()),
                (true, 'v', "bob".to_string()),
                (false, 'o', "alice".to_string()),
            ]
        );
    }

    #[test]
    fn too_few_parameters_is_an_error() {
        let parameterized: HashSet<char> = HashSet::from(['o']);
        let mut modes = HashSet::new();
        let result = apply_modes(&mut modes, "+oo", &["alice".to_string()], &parameterized, |_, _, _| {});
        assert!(result.is_err());
    }
}
