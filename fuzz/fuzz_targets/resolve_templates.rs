#![no_main]

use arbitrary::Arbitrary;
use benchify_domain::{InterpolationContext, resolve_args, resolve_shell};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    template: String,
    args_template: Vec<String>,
    name: String,
    tag: String,
    file: Option<String>,
    extra_args: Vec<String>,
}

fuzz_target!(|input: Input| {
    let ctx = InterpolationContext {
        name: &input.name,
        tag: &input.tag,
        file: input.file.as_deref(),
        extra_args: &input.extra_args,
    };
    let first = resolve_shell(&input.template, &ctx);
    assert_eq!(first, resolve_shell(&input.template, &ctx));
    let _ = resolve_args(&input.args_template, &ctx);
});
