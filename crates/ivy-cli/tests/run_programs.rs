// End-to-end runs: parse, analyze (must be clean), execute, compare output.

use std::cell::RefCell;
use std::rc::Rc;

use ivy_cli::eval::{Interpreter, Value};
use ivy_cli::events::MemEvent;

fn run_program(src: &str) -> Vec<String> {
    let p = ivy_parse::parse_str(src).expect("parse ok");
    let ds = ivy_types::analyze(&p);
    assert!(
        ds.is_empty(),
        "diagnostics: {:?}",
        ds.iter().map(|d| d.to_string()).collect::<Vec<_>>()
    );
    let mut lines = Vec::new();
    let mut on_event = |_e: MemEvent| {};
    ivy_cli::eval::run(&p, &mut |l| lines.push(l), &mut on_event).expect("run ok");
    lines
}

fn run_error(src: &str) -> String {
    let p = ivy_parse::parse_str(src).expect("parse ok");
    let mut lines = Vec::new();
    let mut on_event = |_e: MemEvent| {};
    ivy_cli::eval::run(&p, &mut |l| lines.push(l), &mut on_event)
        .unwrap_err()
        .to_string()
}

#[test]
fn hello_world() {
    let lines = run_program("fn main():\n    print(\"Hello, World!\")\n");
    assert_eq!(lines, vec!["Hello, World!"]);
}

#[test]
fn string_concatenation_with_int() {
    let lines = run_program("fn main():\n    let s: str = \"Total: \" + 10\n    print(s)\n");
    assert_eq!(lines, vec!["Total: 10"]);
}

#[test]
fn closure_captures_enclosing_binding() {
    let src = "fn main():\n    let start: int = 10\n    let adder = |x|:\n        return x + start\n    print(to_string(adder(5)))\n";
    assert_eq!(run_program(src), vec!["15"]);
}

#[test]
fn closure_mutates_captured_binding() {
    let src = "fn main():\n    let mut count: int = 0\n    let inc = ||:\n        count = count + 1\n    inc()\n    inc()\n    print(count)\n";
    assert_eq!(run_program(src), vec!["2"]);
}

#[test]
fn enum_match_with_struct_variant() {
    let src = concat!(
        "enum State:\n",
        "    Idle\n",
        "    Stopped { reason: str }\n",
        "fn main():\n",
        "    let s: State = State::Stopped { reason: \"Done\" }\n",
        "    match s:\n",
        "        State::Stopped { reason } => print(\"Stopped: \" + reason)\n",
        "        State::Idle => print(\"Idle\")\n",
    );
    assert_eq!(run_program(src), vec!["Stopped: Done"]);
}

#[test]
fn trait_method_dispatch() {
    let src = concat!(
        "struct P<T>:\n",
        "    x: T\n",
        "trait Show:\n",
        "    fn desc() -> str\n",
        "impl Show for P<int>:\n",
        "    fn desc() -> str:\n",
        "        return \"x=\" + to_string(this.x)\n",
        "fn main():\n",
        "    let p: P<int> = P { x: 7 }\n",
        "    print(p.desc())\n",
    );
    assert_eq!(run_program(src), vec!["x=7"]);
}

#[test]
fn while_loop_counts_down() {
    let src = "fn main():\n    let mut i: int = 3\n    while i > 0:\n        print(i)\n        i = i - 1\n";
    assert_eq!(run_program(src), vec!["3", "2", "1"]);
}

#[test]
fn for_loop_over_range() {
    let src = "fn main():\n    let mut total: int = 0\n    for n in range(4):\n        total = total + n\n    print(total)\n";
    assert_eq!(run_program(src), vec!["6"]);
}

#[test]
fn option_match_sugar() {
    let src = "fn main():\n    let o = Some(41)\n    match o:\n        Some(v) => print(to_string(v + 1))\n        None => print(\"none\")\n";
    assert_eq!(run_program(src), vec!["42"]);
}

#[test]
fn match_literal_arms_and_braced_body() {
    let src = concat!(
        "fn main():\n",
        "    let n = 2\n",
        "    match n:\n",
        "        1 => print(\"one\")\n",
        "        2 => { print(\"two\") print(\"!\") }\n",
        "        _ => print(\"other\")\n",
    );
    assert_eq!(run_program(src), vec!["two", "!"]);
}

#[test]
fn recursion() {
    let src = "fn fib(n: int) -> int:\n    if n < 2:\n        return n\n    return fib(n - 1) + fib(n - 2)\nfn main():\n    print(fib(10))\n";
    assert_eq!(run_program(src), vec!["55"]);
}

#[test]
fn string_indexing_length_and_iteration() {
    let src = "fn main():\n    let s = \"abc\"\n    print(s[1])\n    print(len(s))\n    for c in \"hi\":\n        print(c)\n";
    assert_eq!(run_program(src), vec!["b", "3", "h", "i"]);
}

#[test]
fn destructuring_let() {
    let src = "fn main():\n    let (a, b) = (1, \"two\")\n    print(a)\n    print(b)\n";
    assert_eq!(run_program(src), vec!["1", "two"]);
}

#[test]
fn to_int_and_to_string() {
    let src = "fn main():\n    print(to_int(\"42\") + 1)\n    print(to_string(5) + \"!\")\n";
    assert_eq!(run_program(src), vec!["43", "5!"]);
}

#[test]
fn alert_without_host_binding_prints_to_output() {
    let lines = run_program("fn main():\n    alert(\"watch out\")\n");
    assert_eq!(lines, vec!["[ALERT] watch out"]);
}

#[test]
fn alert_prefers_a_bound_host_function() {
    let src = "fn main():\n    alert(\"ping\")\n";
    let p = ivy_parse::parse_str(src).expect("parse ok");
    assert!(ivy_types::analyze(&p).is_empty());

    let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();

    let mut lines = Vec::new();
    let mut on_event = |_e: MemEvent| {};
    Interpreter::new()
        .bind_extern(
            "alert",
            Box::new(move |args: &[Value]| {
                sink.borrow_mut().push(args[0].to_string());
                Value::Null
            }),
        )
        .run(&p, &mut |l| lines.push(l), &mut on_event)
        .expect("run ok");

    assert!(lines.is_empty());
    assert_eq!(seen.borrow().as_slice(), ["ping"]);
}

#[test]
fn unbound_extern_returns_null() {
    let src = "extern fn ping(x: int)\nfn main():\n    print(ping(1))\n";
    assert_eq!(run_program(src), vec!["null"]);
}

#[test]
fn top_level_statements_run_before_main() {
    let src = "print(\"first\")\nfn main():\n    print(\"second\")\n";
    assert_eq!(run_program(src), vec!["first", "second"]);
}

#[test]
fn division_by_zero_aborts() {
    let err = run_error("fn main():\n    print(1 / 0)\n");
    assert!(err.contains("division by zero"), "{}", err);
}

#[test]
fn array_index_out_of_bounds_aborts() {
    let err = run_error("fn main():\n    let xs = [1]\n    print(xs[3])\n");
    assert!(err.contains("out of bounds"), "{}", err);
}

#[test]
fn runtime_dispatch_is_prefix_match_on_the_struct_tag() {
    // the instance carries only the erased base name, so the impl whose
    // target string starts with the tag wins
    let src = concat!(
        "struct P<T>:\n",
        "    x: T\n",
        "trait Show:\n",
        "    fn desc() -> str\n",
        "impl Show for P<int>:\n",
        "    fn desc() -> str:\n",
        "        return \"got \" + to_string(this.x)\n",
        "fn show(p: P<int>) -> str:\n",
        "    return p.desc()\n",
        "fn main():\n",
        "    print(show(P { x: 9 }))\n",
    );
    assert_eq!(run_program(src), vec!["got 9"]);
}

#[test]
fn arrays_and_structs_print_readably() {
    let src = concat!(
        "struct Point:\n",
        "    x: int\n",
        "    y: int\n",
        "fn main():\n",
        "    print([1, 2, 3])\n",
        "    print((1, \"a\"))\n",
        "    print(Point { x: 1, y: 2 })\n",
        "    print(Some(5))\n",
    );
    assert_eq!(
        run_program(src),
        vec![
            "[1, 2, 3]",
            "(1, a)",
            "Point { x: 1, y: 2 }",
            "Option::Some(5)",
        ]
    );
}
