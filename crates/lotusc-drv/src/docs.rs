//! The `-docs` printer: a terse reference for the standard library.

use lotusc_gen::stdlib::MODULES;

const DESCRIPTIONS: &[(&str, &str)] = &[
    ("io", "formatted and raw output over write(2)"),
    ("mem", "mmap-backed allocation and byte operations"),
    ("math", "integer arithmetic helpers"),
    ("str", "NUL-terminated string operations"),
    ("num", "width conversions"),
    ("hash", "non-cryptographic hashes (sha256/md5 are placeholders)"),
    ("collections", "array, stack, queue, deque, min-heap, hash map/set"),
    ("net", "Linux socket syscalls"),
    ("http", "minimal HTTP/1.0 client"),
];

/// Print the whole reference, or one module when `section` names it.
/// Returns false when the section does not exist.
pub fn print(section: Option<&str>) -> bool {
    let mut found = section.is_none();

    for (module, funcs) in MODULES {
        if let Some(wanted) = section {
            if wanted != *module {
                continue;
            }
            found = true;
        }

        let blurb = DESCRIPTIONS
            .iter()
            .find(|(m, _)| m == module)
            .map(|(_, d)| *d)
            .unwrap_or("");
        println!("{} - {}", module, blurb);
        for chunk in funcs.chunks(6) {
            println!("    {}", chunk.join(", "));
        }
        println!();
    }

    if !found {
        eprintln!("unknown docs section `{}`", section.unwrap_or_default());
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_module_has_a_description() {
        for (module, _) in MODULES {
            assert!(
                DESCRIPTIONS.iter().any(|(m, _)| m == module),
                "missing docs blurb for {}",
                module
            );
        }
    }

    #[test]
    fn test_known_section_is_found() {
        assert!(print(Some("io")));
        assert!(print(None));
    }

    #[test]
    fn test_unknown_section_reports() {
        assert!(!print(Some("nosuch")));
    }
}
