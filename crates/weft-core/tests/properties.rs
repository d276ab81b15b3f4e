/*!
# Pipeline Properties

Idempotence, round trip and guard counting over generated programs.
*/

use proptest::prelude::*;
use weft_core::pipeline::{InjectOptions, Injector, RemoveOptions, Remover};
use weft_core::{Registry, TransformContext};

#[derive(Debug, Clone)]
enum Piece {
    Guard(&'static str),
    Call(u8),
}

fn piece() -> impl Strategy<Value = (Piece, bool)> {
    let kind = prop_oneof![
        prop_oneof![Just("err"), Just("e"), Just("er"), Just("ex")].prop_map(Piece::Guard),
        (0u8..5).prop_map(Piece::Call),
    ];
    (kind, any::<bool>())
}

fn program(pieces: &[(Piece, bool)], with_main: bool) -> String {
    let mut src = String::new();
    if with_main {
        src.push_str("package main\n\nimport \"github.com/gin-gonic/gin\"\n\nfunc main() {\n\tr := gin.Default()\n\tr.Run()\n}\n\n");
    } else {
        src.push_str("package worker\n\n");
    }
    src.push_str("func work() error {\n");
    for (i, (piece, blank)) in pieces.iter().enumerate() {
        if *blank && i > 0 {
            src.push('\n');
        }
        match piece {
            Piece::Guard(name) => {
                src.push_str(&format!("\tif {name} := step(); {name} != nil {{\n\t\treturn {name}\n\t}}\n"))
            }
            Piece::Call(n) => src.push_str(&format!("\tstep{n}()\n")),
        }
    }
    src.push_str("\treturn nil\n}\n");
    src
}

fn guards(pieces: &[(Piece, bool)]) -> usize {
    pieces.iter().filter(|(p, _)| matches!(p, Piece::Guard(_))).count()
}

proptest! {
    #[test]
    fn prop_one_report_per_guard(pieces in prop::collection::vec(piece(), 0..8), with_main in any::<bool>()) {
        let registry = Registry::builtin();
        let src = program(&pieces, with_main);
        let out = Injector::new(&registry, InjectOptions::default()).inject_source(&src, &TransformContext::new());
        let n = guards(&pieces);
        prop_assert_eq!(out.output.matches("trace.Error(").count(), n);
        let before_return = pieces
            .iter()
            .filter_map(|(p, _)| match p {
                Piece::Guard(name) => Some(format!("\t\ttrace.Error({name})\n\t\treturn {name}\n")),
                Piece::Call(_) => None,
            })
            .all(|expected| out.output.contains(&expected));
        prop_assert!(before_return);
    }

    #[test]
    fn prop_injection_is_idempotent(pieces in prop::collection::vec(piece(), 0..8), with_main in any::<bool>()) {
        let registry = Registry::builtin();
        let injector = Injector::new(&registry, InjectOptions::default());
        let once = injector.inject_source(&program(&pieces, with_main), &TransformContext::new()).output;
        let twice = injector.inject_source(&once, &TransformContext::new()).output;
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_removal_restores_source(pieces in prop::collection::vec(piece(), 0..8), with_main in any::<bool>()) {
        let registry = Registry::builtin();
        let src = program(&pieces, with_main);
        let injected = Injector::new(&registry, InjectOptions::default())
            .inject_source(&src, &TransformContext::new())
            .output;
        let restored = Remover::new(&registry, RemoveOptions::default())
            .remove_source(&injected, &TransformContext::new())
            .output;
        prop_assert_eq!(restored, src);
    }
}
