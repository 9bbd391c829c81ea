// Parsing tests for top-level definitions.

use ivy_ast::ast::{Stmt, VariantFields};
use ivy_parse::parse_str;

/// Helper: parse and return the single top-level statement.
fn parse_one(src: &str) -> Stmt {
    let p = parse_str(src).expect("parse ok");
    assert_eq!(p.stmts.len(), 1, "expected one statement");
    p.stmts.into_iter().next().unwrap()
}

#[test]
fn fn_def_with_params_and_return() {
    let Stmt::Fn(f) = parse_one("fn add(a: int, b: int) -> int:\n    return a + b\n") else {
        panic!("expected Fn");
    };
    assert_eq!(f.name, "add");
    assert_eq!(f.params.len(), 2);
    assert_eq!(f.params[0].name, "a");
    assert_eq!(f.params[0].ty, "int");
    assert_eq!(f.ret_ty.as_deref(), Some("int"));
    assert_eq!(f.body.stmts.len(), 1);
}

#[test]
fn fn_def_without_return_type() {
    let Stmt::Fn(f) = parse_one("fn main():\n    print(1)\n") else {
        panic!("expected Fn");
    };
    assert!(f.ret_ty.is_none());
    assert!(f.params.is_empty());
}

#[test]
fn struct_def_plain() {
    let Stmt::Struct(s) = parse_one("struct Point:\n    x: int\n    y: int\n") else {
        panic!("expected Struct");
    };
    assert_eq!(s.name, "Point");
    assert!(s.type_param.is_none());
    assert_eq!(s.fields.len(), 2);
    assert_eq!(s.fields[1].name, "y");
}

#[test]
fn struct_def_generic() {
    let Stmt::Struct(s) = parse_one("struct Box<T>:\n    v: T\n") else {
        panic!("expected Struct");
    };
    assert_eq!(s.type_param.as_deref(), Some("T"));
    assert_eq!(s.fields[0].ty, "T");
}

#[test]
fn enum_def_with_all_variant_kinds() {
    let src = "enum Shape:\n    Empty\n    Circle { radius: int }\n    Pair(int, str)\n";
    let Stmt::Enum(e) = parse_one(src) else {
        panic!("expected Enum");
    };
    assert_eq!(e.name, "Shape");
    assert_eq!(e.variants.len(), 3);
    assert!(matches!(e.variants[0].fields, VariantFields::Unit));
    let VariantFields::Struct(ref fields) = e.variants[1].fields else {
        panic!("expected struct variant");
    };
    assert_eq!(fields[0].name, "radius");
    let VariantFields::Tuple(ref tys) = e.variants[2].fields else {
        panic!("expected tuple variant");
    };
    assert_eq!(tys, &vec!["int".to_string(), "str".to_string()]);
}

#[test]
fn trait_def_method_sigs() {
    let Stmt::Trait(t) = parse_one("trait Show:\n    fn desc() -> str\n") else {
        panic!("expected Trait");
    };
    assert_eq!(t.name, "Show");
    assert_eq!(t.methods.len(), 1);
    assert_eq!(t.methods[0].name, "desc");
    assert_eq!(t.methods[0].ret_ty, "str");
}

#[test]
fn impl_block_targets_full_type_string() {
    let src = "impl Show for P<int>:\n    fn desc() -> str:\n        return \"p\"\n";
    let Stmt::Impl(i) = parse_one(src) else {
        panic!("expected Impl");
    };
    assert_eq!(i.trait_name, "Show");
    assert_eq!(i.target_ty, "P<int>");
    assert_eq!(i.methods.len(), 1);
    assert_eq!(i.methods[0].name, "desc");
}

#[test]
fn extern_fn_decl() {
    let Stmt::ExternFn(x) = parse_one("extern fn alert(msg: str)\n") else {
        panic!("expected ExternFn");
    };
    assert_eq!(x.name, "alert");
    assert_eq!(x.params[0].ty, "str");
}

#[test]
fn extern_fn_rejects_return_type() {
    let err = parse_str("extern fn f(x: int) -> int\n").unwrap_err().to_string();
    assert!(err.contains("extern functions cannot declare a return type"), "{}", err);
}

#[test]
fn type_annotations_are_canonical_strings() {
    let Stmt::Fn(f) = parse_one(
        "fn f(a: [int], b: (int, str), c: Map<str, [int]>) -> [str]:\n    return b\n",
    ) else {
        panic!("expected Fn");
    };
    assert_eq!(f.params[0].ty, "[int]");
    assert_eq!(f.params[1].ty, "(int, str)");
    assert_eq!(f.params[2].ty, "Map<str, [int]>");
    assert_eq!(f.ret_ty.as_deref(), Some("[str]"));
}

#[test]
fn multiple_items_separated_by_blank_lines() {
    let src = "struct A:\n    x: int\n\nstruct B:\n    y: int\n\nfn main():\n    print(1)\n";
    let p = parse_str(src).expect("parse ok");
    assert_eq!(p.stmts.len(), 3);
}
