//! End-to-end checks of the ownership rules
//!
//! Each test builds the IR a front end would produce for a short program and
//! runs the whole pipeline over it.

use cv_bundle::{BundleTable, ReceiverFacts, Synthesis, VariantFns, VariantImpl};
use cv_cfg::{Argument, BindingKind, Callee, Convention, ConventionSet, Location, Operand, TypeInfo};
use cv_diagnostics::{DiagnosticKind, Severity};
use cv_driver::CopyLowering;
use cv_liveness::UsageContext;
use expect_test::expect;
use integration_tests::{TestFixture, call, call_into, whole};

const SWAP: &str = r"
fun swap(_ a: inout Int, _ b: inout Int)
fun main() {
  var x = 1
  var p = Pair()
  swap(&x, &x)
  swap(&p.first, &p.second)
  swap(&p, &p.first)
}
";

/// Exclusivity: overlapping `inout` arguments of one call
#[test]
fn test_overlapping_inout_arguments_are_rejected() {
    let mut fixture = TestFixture::new(SWAP);
    let int = fixture.ty(TypeInfo::scalar("Int"));
    let pair = fixture.ty(TypeInfo::scalar("Pair").field("first", int).field("second", int));
    let swap = fixture.signature(
        "swap",
        &[("a", Convention::Inout, int), ("b", Convention::Inout, int)],
    );

    let mut body = fixture.body("main");
    let x = body.declare("x", int, BindingKind::Var, fixture.span("x = 1"));
    body.assign(whole(x), Operand::fresh(fixture.span("1")), fixture.span("x = 1"));
    let p = body.declare("p", pair, BindingKind::Var, fixture.span("p = Pair()"));
    body.assign(whole(p), Operand::fresh(fixture.span("Pair()")), fixture.span("p = Pair()"));
    body.call(call(
        Callee::Function(swap),
        vec![
            Argument::marked(whole(x), fixture.span_nth("&x", 0)),
            Argument::marked(whole(x), fixture.span_nth("&x", 1)),
        ],
        fixture.span("swap(&x, &x)"),
    ));
    body.call(call(
        Callee::Function(swap),
        vec![
            Argument::marked(whole(p).part(0), fixture.span("&p.first")),
            Argument::marked(whole(p).part(1), fixture.span("&p.second")),
        ],
        fixture.span("swap(&p.first, &p.second)"),
    ));
    body.call(call(
        Callee::Function(swap),
        vec![
            Argument::marked(whole(p), fixture.span_nth("&p", 2)),
            Argument::marked(whole(p).part(0), fixture.span_nth("&p.first", 1)),
        ],
        fixture.span("swap(&p, &p.first)"),
    ));
    fixture.add(body.finish());

    let report = fixture.analyze();
    let main = report.function("main").unwrap();
    expect![[r#"
        error[exclusivity-violation]: `x` is passed as `inout` while `x` is passed as `inout`
        error[exclusivity-violation]: `p.first` is passed as `inout` while `p` is passed as `inout`
    "#]]
    .assert_eq(&main.summaries());
    assert_eq!(main.diagnostics[0].span, fixture.span_nth("&x", 1));
    assert_eq!(main.diagnostics[0].labels[0].span, fixture.span_nth("&x", 0));
}

const PROJECTION: &str = r"
fun main() {
  var v = Pair()
  inout first = &v.first
  print(v)
  first = 0
}
";

/// Exclusivity: a read of storage held by an `inout` projection
#[test]
fn test_read_under_inout_projection_is_rejected() {
    let mut fixture = TestFixture::new(PROJECTION);
    let int = fixture.ty(TypeInfo::scalar("Int"));
    let pair = fixture.ty(TypeInfo::scalar("Pair").field("first", int));

    let mut body = fixture.body("main");
    let v = body.declare("v", pair, BindingKind::Var, fixture.span("v = Pair()"));
    body.assign(whole(v), Operand::fresh(fixture.span("Pair()")), fixture.span("v = Pair()"));
    let first = body.project(
        "first",
        int,
        whole(v).part(0),
        Convention::Inout,
        fixture.span("inout first = &v.first"),
    );
    body.read(whole(v), fixture.span("print(v)"));
    body.assign(whole(first), Operand::fresh(fixture.span("0")), fixture.span("first = 0"));
    fixture.add(body.finish());

    let report = fixture.analyze();
    expect![[r#"
        error[exclusivity-violation]: cannot access `v` for `let` while it is projected for `inout`
    "#]]
    .assert_eq(&report.function("main").unwrap().summaries());
}

const CONSUME: &str = r"
fun consume(_ v: sink Vector2)
fun main(c: Bool) {
  var v = Vector2()
  consume(v)
  if c { print(v) } else { print(v) }
  v = Vector2()
  print(v)
}
";

/// Consumption finality: every path after a `sink` call rejects the use
#[test]
fn test_use_after_sink_is_rejected_on_every_path() {
    let mut fixture = TestFixture::new(CONSUME);
    let boolean = fixture.ty(TypeInfo::scalar("Bool"));
    let vector = fixture.ty(TypeInfo::scalar("Vector2"));
    let consume = fixture.signature("consume", &[("v", Convention::Sink, vector)]);

    let mut body = fixture.body("main");
    let c = body.param("c", Convention::Let, boolean, fixture.span("c: Bool"));
    let v = body.declare("v", vector, BindingKind::Var, fixture.span("var v"));
    body.assign(
        whole(v),
        Operand::fresh(fixture.span("Vector2()")),
        fixture.span("var v = Vector2()"),
    );
    body.call(call(
        Callee::Function(consume),
        vec![Argument::place(whole(v), fixture.span_nth("v)", 0))],
        fixture.span("consume(v)"),
    ));
    let then_block = body.new_block();
    let else_block = body.new_block();
    let join = body.new_block();
    body.branch(Some(whole(c)), vec![then_block, else_block], fixture.span("if c"));

    body.set_current_block(then_block);
    body.read(whole(v), fixture.span_nth("print(v)", 0));
    body.goto(join, fixture.span_nth("}", 0));

    body.set_current_block(else_block);
    body.read(whole(v), fixture.span_nth("print(v)", 1));
    body.goto(join, fixture.span_nth("}", 1));

    body.set_current_block(join);
    body.assign(
        whole(v),
        Operand::fresh(fixture.span_nth("Vector2()", 1)),
        fixture.span_nth("v = Vector2()", 1),
    );
    body.read(whole(v), fixture.span_nth("print(v)", 2));
    body.ret(None, fixture.span_nth("}", 2));
    fixture.add(body.finish());

    let report = fixture.analyze();
    let main = report.function("main").unwrap();
    expect![[r#"
        error[use-after-consume]: use of consumed value `v`
        error[use-after-consume]: use of consumed value `v`
    "#]]
    .assert_eq(&main.summaries());
    for diag in &main.diagnostics {
        assert_eq!(diag.labels[0].span, fixture.span_nth("v)", 0));
    }
}

const LOOP: &str = r"
fun consume(_ v: sink Vector2)
fun main(c: Bool) {
  var v = Vector2()
  while c { consume(v) }
}
";

/// Consumption finality: a loop that consumes on every iteration
#[test]
fn test_consume_in_loop_is_rejected() {
    let mut fixture = TestFixture::new(LOOP);
    let boolean = fixture.ty(TypeInfo::scalar("Bool"));
    let vector = fixture.ty(TypeInfo::scalar("Vector2"));
    let consume = fixture.signature("consume", &[("v", Convention::Sink, vector)]);

    let mut body = fixture.body("main");
    let c = body.param("c", Convention::Let, boolean, fixture.span("c: Bool"));
    let v = body.declare("v", vector, BindingKind::Var, fixture.span("var v"));
    body.assign(
        whole(v),
        Operand::fresh(fixture.span("Vector2()")),
        fixture.span("var v = Vector2()"),
    );
    let header = body.new_block();
    let looped = body.new_block();
    let exit = body.new_block();
    body.goto(header, fixture.span("while"));

    body.set_current_block(header);
    body.branch(Some(whole(c)), vec![looped, exit], fixture.span("while c"));

    body.set_current_block(looped);
    body.call(call(
        Callee::Function(consume),
        vec![Argument::place(whole(v), fixture.span_nth("v)", 0))],
        fixture.span("consume(v)"),
    ));
    body.goto(header, fixture.span_nth("}", 0));

    body.set_current_block(exit);
    body.ret(None, fixture.span_nth("}", 1));
    fixture.add(body.finish());

    let report = fixture.analyze();
    let main = report.function("main").unwrap();
    assert!(!main.codegen_ready());
    expect![[r#"
        error[use-after-consume]: `v` does not hold a value on every path reaching this point
    "#]]
    .assert_eq(&main.summaries());
    assert_eq!(main.diagnostics[0].span, fixture.span("while c"));
}

/// Inout round-trip: synthesized `sink` behaves like copy-in, `inout`, return
#[test]
fn test_synthesized_sink_matches_inout_round_trip() {
    let table = BundleTable::build(
        ConventionSet::of(&[Convention::Inout]),
        ReceiverFacts {
            copyable: true,
            movable: true,
        },
        true,
    );
    let sink = table.get(Convention::Sink).unwrap();
    assert_eq!(sink, VariantImpl::Synthesized(Synthesis::SinkFromInout));

    let normalize = |values: &mut Vec<i64>| {
        values.sort_unstable();
        values.dedup();
    };
    let fns = VariantFns::new().with_inout(normalize);

    let input = vec![3, 1, 3, 2];
    let mut expected = input.clone();
    normalize(&mut expected);

    assert_eq!(fns.apply_sink(sink, input.clone()).unwrap(), expected);

    let let_variant = table.get(Convention::Let).unwrap();
    assert_eq!(let_variant, VariantImpl::Synthesized(Synthesis::LetFromInout));
    assert_eq!(fns.apply_let(let_variant, &input).unwrap(), expected);
}

const OFFSET: &str = r"
fun offset(by: Int) -> Vector2
fun main(d: Int) {
  var v = Vector2()
  let r = v.offset(by: d)
  print(r)
}
";

/// Builds `main` for [`OFFSET`] against a bundle declaring `declared`. With
/// `reuse` the receiver is read again after the call; with `marked` it is
/// passed as `&v`.
fn offset_fixture(declared: &[Convention], reuse: bool, marked: bool) -> TestFixture {
    let mut fixture = TestFixture::new(OFFSET);
    let int = fixture.ty(TypeInfo::scalar("Int"));
    let vector = fixture.ty(TypeInfo::scalar("Vector2"));
    let offset = fixture.bundle("offset", vector, declared, &[("by", Convention::Let, int)]);
    let print = fixture.signature("print", &[("value", Convention::Let, vector)]);

    let mut body = fixture.body("main");
    let d = body.param("d", Convention::Let, int, fixture.span("d: Int"));
    let v = body.declare("v", vector, BindingKind::Var, fixture.span("var v"));
    body.assign(
        whole(v),
        Operand::fresh(fixture.span("Vector2()")),
        fixture.span("var v = Vector2()"),
    );
    let r = body.declare("r", vector, BindingKind::Let, fixture.span("let r"));
    let receiver = if marked {
        Argument::marked(whole(v), fixture.span("v.offset"))
    } else {
        Argument::place(whole(v), fixture.span("v.offset"))
    };
    body.call(call_into(
        Callee::Bundle(offset),
        vec![receiver, Argument::place(whole(d), fixture.span("d)"))],
        whole(r),
        fixture.span("v.offset(by: d)"),
    ));
    body.call(call(
        Callee::Function(print),
        vec![Argument::place(whole(r), fixture.span("r)"))],
        fixture.span("print(r)"),
    ));
    if reuse {
        body.call(call(
            Callee::Function(print),
            vec![Argument::place(whole(v), fixture.span("var v"))],
            fixture.span("print(r)"),
        ));
    }
    fixture.add(body.finish());
    fixture
}

const OFFSET_CALL: Location = Location {
    block: 0,
    statement_index: 3,
};

/// Last-use sink preference, with `sink` declared or synthesized
#[test]
fn test_last_use_receiver_selects_sink() {
    let declared = offset_fixture(&[Convention::Let, Convention::Sink], false, false);
    let report = declared.analyze();
    let main = report.function("main").unwrap();
    assert!(main.diagnostics.is_empty());
    let call = main.annotations.call(OFFSET_CALL).unwrap();
    assert_eq!(call.context, Some(UsageContext::LastUse));
    assert_eq!(
        call.variant.as_ref().unwrap().implementation,
        VariantImpl::Declared(Convention::Sink)
    );

    let synthesized = offset_fixture(&[Convention::Let, Convention::Inout], false, false);
    let report = synthesized.analyze();
    let call = report.function("main").unwrap().annotations.call(OFFSET_CALL).unwrap();
    let variant = call.variant.as_ref().unwrap();
    assert_eq!(variant.requested, Convention::Sink);
    assert_eq!(
        variant.implementation,
        VariantImpl::Synthesized(Synthesis::SinkFromInout)
    );
    assert_eq!(call.conventions, vec![Convention::Sink, Convention::Let]);
}

/// A receiver used again keeps `let`; the mutation marker wins over last use
#[test]
fn test_usage_context_precedence() {
    let continued = offset_fixture(&[Convention::Let, Convention::Sink], true, false);
    let report = continued.analyze();
    let main = report.function("main").unwrap();
    assert!(main.diagnostics.is_empty());
    let call = main.annotations.call(OFFSET_CALL).unwrap();
    assert_eq!(call.context, Some(UsageContext::ContinuedUse));
    assert_eq!(
        call.variant.as_ref().unwrap().implementation,
        VariantImpl::Declared(Convention::Let)
    );

    let marked = offset_fixture(&[Convention::Let, Convention::Sink], false, true);
    let report = marked.analyze();
    let call = report.function("main").unwrap().annotations.call(OFFSET_CALL).unwrap();
    assert_eq!(call.context, Some(UsageContext::Mutating));
    assert_eq!(
        call.variant.as_ref().unwrap().implementation,
        VariantImpl::Synthesized(Synthesis::InoutFromSink)
    );
}

const PEEK: &str = r"
fun peek() -> Int
fun main() {
  var v = Pinned()
  v.peek()
}
";

/// A receiver at its last use needs `sink`, which an immovable type cannot
/// synthesize from `let`
#[test]
fn test_immovable_last_use_receiver_has_no_sink() {
    let mut fixture = TestFixture::new(PEEK);
    let pinned = fixture.ty(TypeInfo::linear("Pinned").movable(false));
    let peek = fixture.bundle("peek", pinned, &[Convention::Let], &[]);

    let mut body = fixture.body("main");
    let v = body.declare("v", pinned, BindingKind::Var, fixture.span("var v"));
    body.assign(
        whole(v),
        Operand::fresh(fixture.span("Pinned()")),
        fixture.span("var v = Pinned()"),
    );
    body.call(call(
        Callee::Bundle(peek),
        vec![Argument::place(whole(v), fixture.span("v.peek"))],
        fixture.span("v.peek()"),
    ));
    fixture.add(body.finish());

    let report = fixture.analyze();
    let main = report.function("main").unwrap();
    assert!(main.has_errors());
    expect![[r#"
        error[bundle-variant-unavailable]: no `sink` variant of `peek` is available
    "#]]
    .assert_eq(&main.summaries());
    assert_eq!(main.diagnostics[0].span, fixture.span("v.peek()"));
    assert!(main.annotations.call(Location::new(0, 2)).unwrap().variant.is_none());
}

const DISTANCE: &str = r"
fun distance(a: Int, b: Int) -> Int {
  let space = a - b
  return space.copy()
}
";

fn distance_fixture(config: &str) -> TestFixture {
    let mut fixture = TestFixture::new(DISTANCE).with_config(config).unwrap();
    let int = fixture.ty(TypeInfo::scalar("Int"));

    let mut body = fixture.body("distance");
    body.param("a", Convention::Let, int, fixture.span("a: Int"));
    body.param("b", Convention::Let, int, fixture.span("b: Int"));
    let space = body.declare("space", int, BindingKind::Let, fixture.span("let space"));
    body.assign(
        whole(space),
        Operand::fresh(fixture.span("a - b")),
        fixture.span("let space = a - b"),
    );
    body.ret(
        Some(Operand::copy(whole(space), fixture.span("space.copy()"))),
        fixture.span("return space.copy()"),
    );
    fixture.add(body.finish());
    fixture
}

/// Unnecessary copy: returning a copy of a dead local
#[test]
fn test_copy_of_dead_local_is_unnecessary() {
    let fixture = distance_fixture("");
    let report = fixture.analyze();
    let distance = report.function("distance").unwrap();

    expect![[r#"
        warning[unnecessary-copy]: unnecessary copy of `space`
    "#]]
    .assert_eq(&distance.summaries());
    assert!(distance.codegen_ready());

    let diag = &distance.diagnostics[0];
    assert_eq!(diag.severity, Severity::Warning);
    let fix = diag.suggestion.as_ref().unwrap();
    assert_eq!(fix.replacement, "return space");
    assert_eq!(fix.span, fixture.span("return space.copy()"));
    assert_eq!(
        distance.annotations.copy(Location::new(0, 2)),
        Some(CopyLowering::Fresh)
    );
}

/// The lint can be switched off
#[test]
fn test_unnecessary_copy_can_be_allowed() {
    let fixture = distance_fixture("[copies]\nunnecessary_copy = \"allow\"\n");
    assert!(fixture.analyze().function("distance").unwrap().diagnostics.is_empty());
}

const INIT: &str = r"
type Pair { var first: Int }
init(self: set Pair, buffer: Buffer) {
  self.first = buffer[1]
}
";

fn init_fixture(copied: bool, element: TypeInfo) -> TestFixture {
    let mut fixture = TestFixture::new(INIT);
    let element = fixture.ty(element);
    let buffer_ty = fixture.ty(TypeInfo::linear("Buffer").element(element).element(element));
    let pair = fixture.ty(TypeInfo::linear("Pair").field("first", element));

    let mut body = fixture.body("init");
    let this = body.param("self", Convention::Set, pair, fixture.span("self: set Pair"));
    let buffer = body.param("buffer", Convention::Let, buffer_ty, fixture.span("buffer: Buffer"));
    let source = whole(buffer).part(1);
    let value_span = fixture.span("buffer[1]");
    let value = if copied {
        Operand::copy(source, value_span)
    } else {
        Operand::borrow(source, value_span)
    };
    body.assign(whole(this).part(0), value, fixture.span("self.first = buffer[1]"));
    fixture.add(body.finish());
    fixture
}

/// Missing copy: storing a borrowed element into a field
#[test]
fn test_storing_borrowed_element_needs_copy() {
    let fixture = init_fixture(false, TypeInfo::scalar("Int"));
    let report = fixture.analyze();
    let init = report.function("init").unwrap();

    expect![[r#"
        error[missing-copy]: `buffer[1]` is borrowed and escapes without a copy
    "#]]
    .assert_eq(&init.summaries());
    let diag = &init.diagnostics[0];
    assert_eq!(diag.span, fixture.span("buffer[1]"));
    assert_eq!(diag.labels[0].span, fixture.span("self.first = buffer[1]"));
    assert_eq!(diag.labels[0].message, "stored into `self.first` here");
    assert_eq!(diag.suggestion.as_ref().unwrap().replacement, "buffer[1].copy()");
}

/// Inserting the copy resolves the escape
#[test]
fn test_copied_element_is_accepted() {
    let fixture = init_fixture(true, TypeInfo::scalar("Int"));
    let report = fixture.analyze();
    let init = report.function("init").unwrap();

    assert!(init.diagnostics.is_empty());
    assert_eq!(
        init.annotations.copy(Location::new(0, 0)),
        Some(CopyLowering::Fresh)
    );
}

/// Elements that cannot be copied need an owned parameter instead
#[test]
fn test_non_copyable_element_escape_is_illegal() {
    let fixture = init_fixture(false, TypeInfo::linear("Handle"));
    let report = fixture.analyze();
    let init = report.function("init").unwrap();

    expect![[r#"
        error[illegal-escape]: `buffer[1]` escapes its borrow, and `Handle` is not copyable
    "#]]
    .assert_eq(&init.summaries());
    let fix = init.diagnostics[0].suggestion.as_ref().unwrap();
    assert_eq!(fix.replacement, "buffer: sink Buffer");
    assert_eq!(fix.span, fixture.span("buffer: Buffer"));
}

const KEEP: &str = r"
fun keep(buffer: Buffer) -> Buffer {
  var x = buffer
  return x
}
";

fn keep_fixture(buffer: TypeInfo) -> TestFixture {
    let mut fixture = TestFixture::new(KEEP);
    let buffer_ty = fixture.ty(buffer);

    let mut body = fixture.body("keep");
    let buffer = body.param("buffer", Convention::Let, buffer_ty, fixture.span("buffer: Buffer"));
    let x = body.declare("x", buffer_ty, BindingKind::Var, fixture.span("var x"));
    body.assign(
        whole(x),
        Operand::borrow(whole(buffer), fixture.span_nth("buffer", 1)),
        fixture.span("var x = buffer"),
    );
    body.ret(
        Some(Operand::borrow(whole(x), fixture.span("x\n"))),
        fixture.span("return x"),
    );
    fixture.add(body.finish());
    fixture
}

/// A borrowed parameter cannot become an owned local without a copy
#[test]
fn test_let_parameter_bound_to_var_needs_copy() {
    let fixture = keep_fixture(TypeInfo::scalar("Buffer"));
    let report = fixture.analyze();
    let keep = report.function("keep").unwrap();

    expect![[r#"
        error[missing-copy]: `buffer` is borrowed and escapes without a copy
    "#]]
    .assert_eq(&keep.summaries());
    let diag = &keep.diagnostics[0];
    assert_eq!(diag.span, fixture.span_nth("buffer", 1));
    assert_eq!(diag.labels[0].message, "ownership taken here");
    assert_eq!(diag.suggestion.as_ref().unwrap().replacement, "buffer.copy()");

    let linear = keep_fixture(TypeInfo::linear("Buffer"));
    let report = linear.analyze();
    expect![[r#"
        error[illegal-escape]: `buffer` escapes its borrow, and `Buffer` is not copyable
    "#]]
    .assert_eq(&report.function("keep").unwrap().summaries());
}

const SET: &str = r"
fun fill(x: set Int) {
  print(x)
  x = 0
}
fun main() {
  var y: Int
  fill(&y)
  print(y)
  fill(&y)
}
";

/// Set convention: read before assignment in the callee, initialized binding
/// in the caller
#[test]
fn test_set_parameter_and_argument() {
    let mut fixture = TestFixture::new(SET);
    let int = fixture.ty(TypeInfo::scalar("Int"));
    let fill = fixture.signature("fill", &[("x", Convention::Set, int)]);

    let mut callee = fixture.body("fill");
    let x = callee.param("x", Convention::Set, int, fixture.span("x: set Int"));
    callee.read(whole(x), fixture.span("print(x)"));
    callee.assign(whole(x), Operand::fresh(fixture.span("0")), fixture.span("x = 0"));
    fixture.add(callee.finish());

    let mut caller = fixture.body("main");
    let y = caller.declare("y", int, BindingKind::Var, fixture.span("var y: Int"));
    caller.call(call(
        Callee::Function(fill),
        vec![Argument::marked(whole(y), fixture.span_nth("&y", 0))],
        fixture.span_nth("fill(&y)", 0),
    ));
    caller.read(whole(y), fixture.span("print(y)"));
    caller.call(call(
        Callee::Function(fill),
        vec![Argument::marked(whole(y), fixture.span_nth("&y", 1))],
        fixture.span_nth("fill(&y)", 1),
    ));
    fixture.add(caller.finish());

    let report = fixture.analyze();
    expect![[r#"
        error[uninitialized-use]: use of uninitialized value `x`
    "#]]
    .assert_eq(&report.function("fill").unwrap().summaries());

    // The first call initializes `y`, so only the second call is rejected.
    let main = report.function("main").unwrap();
    assert_eq!(main.diagnostics.len(), 1);
    assert_eq!(main.diagnostics[0].kind, DiagnosticKind::SetOnInitialized);
    assert_eq!(main.diagnostics[0].span, fixture.span_nth("&y", 1));
}
