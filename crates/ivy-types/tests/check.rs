// Type rules: nominal checking, `any`, generics, iteration, indexing,
// trait dispatch, and enum patterns.

use ivy_parse::parse_str;
use ivy_types::analyze;

fn diags(src: &str) -> Vec<String> {
    let p = parse_str(src).expect("parse ok");
    analyze(&p).iter().map(|d| d.to_string()).collect()
}

fn assert_clean(src: &str) {
    let ds = diags(src);
    assert!(ds.is_empty(), "expected no diagnostics, got: {:?}", ds);
}

#[test]
fn hello_world_is_clean() {
    assert_clean("fn main():\n    print(\"Hello, World!\")\n");
}

#[test]
fn string_concat_with_int_yields_str() {
    assert_clean("fn main():\n    let s: str = \"Total: \" + 10\n    print(s)\n");
}

#[test]
fn declared_type_must_match_initializer() {
    let ds = diags("fn main():\n    let n: int = \"five\"\n");
    assert!(
        ds.iter().any(|d| d.contains("Type mismatch for 'n'")),
        "{:?}",
        ds
    );
}

#[test]
fn omitted_annotation_adopts_initializer_type() {
    let ds = diags("fn main():\n    let n = 5\n    let s: str = n\n");
    assert!(ds.iter().any(|d| d.contains("Type mismatch for 's'")), "{:?}", ds);
}

#[test]
fn assignment_requires_mut() {
    let ds = diags("fn main():\n    let a = 1\n    a = 2\n");
    assert!(
        ds.iter()
            .any(|d| d.contains("Cannot assign to immutable variable 'a'")),
        "{:?}",
        ds
    );
    assert_clean("fn main():\n    let mut a = 1\n    a = 2\n");
}

#[test]
fn assignment_type_must_match_declared() {
    let ds = diags("fn main():\n    let mut a = 1\n    a = \"x\"\n");
    assert!(ds.iter().any(|d| d.contains("Type mismatch for 'a'")), "{:?}", ds);
}

#[test]
fn undefined_names_are_reported() {
    let ds = diags("fn main():\n    print(missing)\n    nothing()\n");
    assert!(ds.iter().any(|d| d.contains("Undefined variable 'missing'")), "{:?}", ds);
    assert!(ds.iter().any(|d| d.contains("Undefined function 'nothing'")), "{:?}", ds);
}

#[test]
fn call_arity_is_checked() {
    let ds = diags("fn add(a: int, b: int) -> int:\n    return a + b\nfn main():\n    add(1)\n");
    assert!(
        ds.iter().any(|d| d.contains("'add' expects 2 argument(s), found 1")),
        "{:?}",
        ds
    );
}

#[test]
fn empty_array_is_list_of_any() {
    assert_clean("fn main():\n    let xs: [int] = []\n    print(len(xs))\n");
}

#[test]
fn iteration_over_lists_and_strings() {
    assert_clean("fn main():\n    for x in [1, 2]:\n        print(x)\n    for c in \"abc\":\n        print(c)\n");
    let ds = diags("fn main():\n    for x in 5:\n        print(x)\n");
    assert!(ds.iter().any(|d| d.contains("Cannot iterate over type 'int'")), "{:?}", ds);
}

#[test]
fn loop_item_takes_element_type() {
    let ds = diags("fn main():\n    for x in [1, 2]:\n        let s: str = x\n");
    assert!(ds.iter().any(|d| d.contains("Type mismatch for 's'")), "{:?}", ds);
}

#[test]
fn indexing_rules() {
    assert_clean(
        "fn main():\n    let xs = [1, 2]\n    let n: int = xs[0]\n    let s: str = \"abc\"[1]\n",
    );
    let ds = diags("fn main():\n    let n = 5\n    print(n[0])\n");
    assert!(ds.iter().any(|d| d.contains("Cannot index type 'int'")), "{:?}", ds);
    let ds = diags("fn main():\n    let xs = [1]\n    print(xs[\"a\"])\n");
    assert!(ds.iter().any(|d| d.contains("Index must be int")), "{:?}", ds);
}

#[test]
fn generic_field_resolution() {
    // struct Box<T> with v: T — reading c.v off Box<str> has type str
    let src = "struct Box<T>:\n    v: T\nfn main():\n    let c: Box<str> = Box { v: \"x\" }\n    let s: str = c.v\n    print(s)\n";
    assert_clean(src);
    let bad = "struct Box<T>:\n    v: T\nfn main():\n    let c: Box<str> = Box { v: \"x\" }\n    let n: int = c.v\n";
    let ds = diags(bad);
    assert!(ds.iter().any(|d| d.contains("Type mismatch for 'n'")), "{:?}", ds);
}

#[test]
fn struct_literal_infers_generic_argument() {
    let ds = diags("struct Box<T>:\n    v: T\nfn main():\n    let c: Box<str> = Box { v: 1 }\n");
    assert!(ds.iter().any(|d| d.contains("Type mismatch for 'c'")), "{:?}", ds);
}

#[test]
fn struct_field_checks() {
    let base = "struct P:\n    x: int\n    y: int\n";
    let ds = diags(&format!("{}fn main():\n    let p: P = P {{ x: 1 }}\n", base));
    assert!(ds.iter().any(|d| d.contains("Missing field 'y'")), "{:?}", ds);
    let ds = diags(&format!(
        "{}fn main():\n    let p: P = P {{ x: 1, y: 2, z: 3 }}\n",
        base
    ));
    assert!(ds.iter().any(|d| d.contains("Unknown field 'z'")), "{:?}", ds);
    let ds = diags("fn main():\n    let p = Nope { x: 1 }\n");
    assert!(ds.iter().any(|d| d.contains("Unknown struct 'Nope'")), "{:?}", ds);
}

#[test]
fn duplicate_struct_definitions_are_reported() {
    let ds = diags("struct A:\n    x: int\nstruct A:\n    y: int\n");
    assert!(ds.iter().any(|d| d.contains("Duplicate struct definition 'A'")), "{:?}", ds);
}

#[test]
fn trait_dispatch_checks_exact_type_string() {
    let src = "struct P<T>:\n    x: T\ntrait Show:\n    fn desc() -> str\nimpl Show for P<int>:\n    fn desc() -> str:\n        return \"x=\" + to_string(this.x)\nfn main():\n    let p: P<int> = P { x: 7 }\n    print(p.desc())\n";
    assert_clean(src);

    // a receiver of a different instantiation finds no impl
    let miss = "struct P<T>:\n    x: T\ntrait Show:\n    fn desc() -> str\nimpl Show for P<int>:\n    fn desc() -> str:\n        return \"i\"\nfn main():\n    let p: P<str> = P { x: \"s\" }\n    print(p.desc())\n";
    let ds = diags(miss);
    assert!(
        ds.iter().any(|d| d.contains("Method 'desc' not found for type 'P<str>'")),
        "{:?}",
        ds
    );
}

#[test]
fn method_arity_is_checked() {
    let src = "struct P:\n    x: int\ntrait Show:\n    fn desc() -> str\nimpl Show for P:\n    fn desc() -> str:\n        return \"p\"\nfn main():\n    let p: P = P { x: 1 }\n    p.desc(1)\n";
    let ds = diags(src);
    assert!(ds.iter().any(|d| d.contains("'desc' expects 0 argument(s), found 1")), "{:?}", ds);
}

#[test]
fn unknown_trait_in_impl_is_reported() {
    let ds = diags("struct P:\n    x: int\nimpl Ghost for P:\n    fn f() -> str:\n        return \"x\"\n");
    assert!(ds.iter().any(|d| d.contains("Unknown trait 'Ghost'")), "{:?}", ds);
}

#[test]
fn option_pattern_requires_option_subject() {
    let src = "fn main():\n    let o = Some(5)\n    match o:\n        Some(v) => print(v)\n        None => print(\"none\")\n";
    assert_clean(src);

    let bad = "fn main():\n    let n = (1, 2)\n    match n:\n        Some(v) => print(v)\n        _ => print(\"no\")\n";
    let ds = diags(bad);
    assert!(ds.iter().any(|d| d.contains("Pattern expects 'Option'")), "{:?}", ds);
}

#[test]
fn option_inner_binding_takes_extracted_type() {
    let src = "fn main():\n    let o = Some(5)\n    match o:\n        Some(v) =>\n            let s: str = v\n        None => print(\"none\")\n";
    let ds = diags(src);
    assert!(ds.iter().any(|d| d.contains("Type mismatch for 's'")), "{:?}", ds);
}

#[test]
fn user_enum_pattern_requires_matching_enum() {
    let src = "enum State:\n    Idle\nenum Other:\n    Thing\nfn main():\n    let s: State = State::Idle\n    match s:\n        Other::Thing => print(\"o\")\n        _ => print(\"x\")\n";
    let ds = diags(src);
    assert!(ds.iter().any(|d| d.contains("Pattern expects 'Other'")), "{:?}", ds);
}

#[test]
fn enum_pattern_fields_bind_as_any() {
    // the destructured name flows as `any`, so either use is accepted
    let src = "enum State:\n    Stopped { reason: str }\nfn main():\n    let s: State = State::Stopped { reason: \"done\" }\n    match s:\n        State::Stopped { reason } =>\n            let n: int = reason\n            print(n)\n        _ => print(\"x\")\n";
    assert_clean(src);
}

#[test]
fn arithmetic_operand_mismatch() {
    let ds = diags("fn main():\n    let x = 1 - true\n");
    assert!(ds.iter().any(|d| d.contains("Type mismatch in arithmetic")), "{:?}", ds);
}

#[test]
fn comparisons_produce_bool() {
    assert_clean("fn main():\n    let b: bool = 1 < 2\n    if b:\n        print(\"yes\")\n");
}

#[test]
fn condition_must_be_bool() {
    let ds = diags("fn main():\n    if 1:\n        print(\"x\")\n");
    assert!(ds.iter().any(|d| d.contains("Type mismatch in if condition")), "{:?}", ds);
}

#[test]
fn lambda_call_on_local_binding_is_accepted() {
    assert_clean(
        "fn main():\n    let start: int = 10\n    let adder = |x|:\n        return x + start\n    print(to_string(adder(5)))\n",
    );
}

#[test]
fn calling_a_non_function_binding_is_reported() {
    let ds = diags("struct P:\n    x: int\nfn main():\n    let p: P = P { x: 1 }\n    p(1)\n");
    assert!(ds.iter().any(|d| d.contains("'p' is not callable")), "{:?}", ds);
}

#[test]
fn destructuring_checks_tuple_shape() {
    assert_clean("fn main():\n    let (a, b) = (1, \"x\")\n    print(a)\n    print(b)\n");
    let ds = diags("fn main():\n    let (a, b) = 5\n");
    assert!(ds.iter().any(|d| d.contains("Cannot destructure non-tuple type 'int'")), "{:?}", ds);
}

#[test]
fn return_type_is_checked_when_declared() {
    let ds = diags("fn f() -> int:\n    return \"x\"\n");
    assert!(ds.iter().any(|d| d.contains("Type mismatch in return value")), "{:?}", ds);
}

#[test]
fn analyzer_accumulates_multiple_findings() {
    let ds = diags("fn main():\n    let a = 1\n    a = 2\n    print(missing)\n    for x in 5:\n        print(x)\n");
    assert!(ds.len() >= 3, "{:?}", ds);
}
