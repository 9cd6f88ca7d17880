/// Asserts that each element of the vector matches the pattern at the same position, and that
/// the vector holds no further elements.
macro_rules! assert_vec_match {
    ($vector:expr $(,)?) => {{
        let vector = &$vector;
        if !vector.is_empty() {
            panic!("Expected an empty vector, but the vector contained {} elements", vector.len());
        }
    }};

    ($vector:expr, $($pattern:pat $(if $cond:expr)?),+ $(,)?) => {{
        let vector = &$vector;
        let mut index = 0usize;
        $(
            match vector.get(index) {
                Some($pattern) $(if $cond)? => (),
                other => panic!(
                    "Match failed on index {}: {:?} vs {}",
                    index,
                    other,
                    stringify!($pattern)
                ),
            }

            index += 1;
        )+

        if vector.len() > index {
            panic!("Vector contained {} elements but only {} were expected", vector.len(), index);
        }
    }};
}

/// Asserts that at least one element of the vector matches the pattern
macro_rules! assert_vec_contains {
    ($vector:expr, $pattern:pat $(if $cond:expr)?) => {{
        let vector = &$vector;
        if !vector.iter().any(|x| matches!(x, $pattern $(if $cond)?)) {
            panic!(
                "Vector had {} elements but none matched '{}'",
                vector.len(),
                stringify!($pattern)
            );
        }
    }};
}
