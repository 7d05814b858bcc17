#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(program) = symgo_syntax::parse(s) {
            let ctx = symgo_ir::Context::new();
            let options = symgo_symex::SymexOptions {
                // Keep loops and recursion bounded so every input terminates.
                max_unwind: 2,
                ..Default::default()
            };
            let mut equation = symgo_symex::Equation::new(options.equation_config());
            let mut engine = symgo_symex::Engine::new(&program, &ctx, &options, &mut equation);
            let _ = engine.run(&symgo_ir::Name::new("main"));
        }
    }
});
