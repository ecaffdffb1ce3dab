//! Fixed-point optimizer driver

use crate::condense::condense;
use crate::loops::recognize_loops;
use bfvm_ir::Program;

/// How hard to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    /// Leave the program untouched.
    None,
    /// Condense + loop recognition to a fixed point.
    #[default]
    Normal,
}

/// Driver configuration.
#[derive(Debug, Clone, Copy)]
pub struct OptConfig {
    pub level: OptLevel,
    /// Upper bound on full pass cycles; a cycle whose content hash
    /// matches its input ends iteration early.
    pub max_iterations: u32,
}

impl Default for OptConfig {
    fn default() -> Self {
        OptConfig {
            level: OptLevel::Normal,
            max_iterations: 16,
        }
    }
}

/// Optimize a program according to `config`.
pub fn optimize(program: &Program, config: &OptConfig) -> Program {
    match config.level {
        OptLevel::None => program.clone(),
        OptLevel::Normal => {
            let mut current = program.clone();
            for iteration in 0..config.max_iterations {
                let before = current.hash();
                current = condense(&current);
                current = recognize_loops(&current);
                if current.hash() == before {
                    log::debug!(
                        "optimizer settled after {} iteration(s), {} -> {} instructions",
                        iteration + 1,
                        program.len(),
                        current.len()
                    );
                    return current;
                }
            }
            log::debug!(
                "optimizer hit the iteration cap at {}",
                config.max_iterations
            );
            current
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bfvm_ir::Opcode;
    use bfvm_parser::parse_brainfuck;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_level_none_is_identity() {
        let p = parse_brainfuck(b"+++[->+<]").unwrap();
        let config = OptConfig {
            level: OptLevel::None,
            ..OptConfig::default()
        };
        assert_eq!(optimize(&p, &config), p);
    }

    #[test]
    fn test_fixed_point_is_stable() {
        for source in [
            &b"++++++++[>++++++++<-]>+."[..],
            &b",>,<[->+<]>."[..],
            &b"+++[>+++<-]>[-]."[..],
            &b">>>[<]"[..],
        ] {
            let p = parse_brainfuck(source).unwrap();
            let once = optimize(&p, &OptConfig::default());
            let twice = optimize(&once, &OptConfig::default());
            assert_eq!(once.hash(), twice.hash());
        }
    }

    #[test]
    fn test_constant_program_collapses_to_output() {
        // 8*8+1 = 65: the whole computation folds into one constant out.
        let p = parse_brainfuck(b"++++++++[>++++++++<-]>+.").unwrap();
        let o = optimize(&p, &OptConfig::default());
        assert!(o.len() < p.len());
        assert!(!o.tags.contains(&Opcode::LoopStart));
    }

    #[test]
    fn test_io_never_dropped_or_duplicated() {
        let p = parse_brainfuck(b",[->+<]>.").unwrap();
        let o = optimize(&p, &OptConfig::default());
        let count =
            |prog: &Program, tag: Opcode| prog.tags.iter().filter(|&&t| t == tag).count();
        assert_eq!(count(&o, Opcode::In), 1);
        assert_eq!(
            count(&o, Opcode::Out) + count(&o, Opcode::OutValue),
            1
        );
    }

    #[test]
    fn test_ends_with_halt() {
        for source in [&b""[..], &b"+."[..], &b",[-]"[..]] {
            let o = optimize(&parse_brainfuck(source).unwrap(), &OptConfig::default());
            assert_eq!(*o.tags.last().unwrap(), Opcode::Halt);
        }
    }
}
