use vela::{Interpreter, Value};

fn int_of(v: &Value) -> i64 {
    match v.as_int() {
        Some(i) => i.to_string().parse().expect("small int"),
        None => panic!("expected int, got {}", v.type_name()),
    }
}

fn run_int(src: &str) -> i64 {
    let mut interp = Interpreter::new();
    int_of(&interp.run(src).unwrap())
}

fn run_str(src: &str) -> String {
    let mut interp = Interpreter::new();
    let v = interp.run(src).unwrap();
    v.as_str().unwrap().to_string()
}

fn run_bool(src: &str) -> bool {
    let mut interp = Interpreter::new();
    match interp.run(src).unwrap() {
        Value::Bool(b) => b,
        other => panic!("expected bool, got {}", other.type_name()),
    }
}

/// Returns the builtin exception type name an uncaught `throw`/runtime
/// failure surfaced as.
fn run_exc_name(src: &str) -> String {
    let mut interp = Interpreter::new();
    match interp.run(src) {
        Ok(v) => panic!("expected an uncaught exception, got {v:?}"),
        Err(vela::Error::Runtime(v)) => match &*v {
            Value::Exception(e) => e.ty.name.clone(),
            other => panic!("expected an exception value, got {other:?}"),
        },
        Err(other) => panic!("expected Error::Runtime, got {other:?}"),
    }
}

#[test]
fn arithmetic() {
    assert_eq!(run_int("ret 2 + 2"), 4);
    assert_eq!(run_int("ret 10 - 3"), 7);
    assert_eq!(run_int("ret 4 * 5"), 20);
    assert_eq!(run_int("ret 10 // 3"), 3);
    assert_eq!(run_int("ret 10 % 3"), 1);
    assert_eq!(run_int("ret 2 ** 8"), 256);
    assert_eq!(run_int("ret -5 + 2"), -3);
    assert_eq!(run_int("ret ~0"), -1);

    let mut interp = Interpreter::new();
    let v = interp.run("ret 10 / 4").unwrap();
    assert_eq!(v.as_f64().unwrap(), 2.5);
}

#[test]
fn big_integers_promote_past_i64() {
    let mut interp = Interpreter::new();
    let v = interp.run("ret 99999999999999999999 * 2").unwrap();
    assert_eq!(v.to_display_string(), "199999999999999999998");
}

#[test]
fn variables_persist_across_run_calls() {
    let mut interp = Interpreter::new();
    interp.run("x = 10").unwrap();
    interp.run("y = 20").unwrap();
    let v = interp.run("ret x + y").unwrap();
    assert_eq!(int_of(&v), 30);
}

#[test]
fn compound_assignment() {
    let mut interp = Interpreter::new();
    interp.run("x = 10").unwrap();
    interp.run("x += 5").unwrap();
    interp.run("x *= 2").unwrap();
    assert_eq!(int_of(&interp.run("ret x").unwrap()), 30);
}

#[test]
fn strings() {
    assert_eq!(run_str("ret 'hello' + ' ' + 'world'"), "hello world");
    assert_eq!(run_str("ret 'ab' * 3"), "ababab");
    assert_eq!(run_str("ret \"double quoted\""), "double quoted");
    assert_eq!(run_int("ret len('hello')"), 5);
}

#[test]
fn string_methods() {
    assert_eq!(run_str("ret 'Hello World'.lower()"), "hello world");
    assert_eq!(run_str("ret '  pad  '.strip()"), "pad");
    assert_eq!(run_bool("ret 'hello'.startswith('he')"), true);
    let mut interp = Interpreter::new();
    let v = interp.run("ret 'a,b,c'.split(',')").unwrap();
    let Value::List(items) = v else { panic!("expected list") };
    let items = items.borrow();
    assert_eq!(items.len(), 3);
    assert_eq!(items[1].as_str().unwrap(), "b");
}

#[test]
fn lists_and_indexing() {
    let mut interp = Interpreter::new();
    let v = interp.run("ret [1, 2, 3]").unwrap();
    let Value::List(items) = v else { panic!("expected list") };
    assert_eq!(items.borrow().len(), 3);

    interp.run("nums = [10, 20, 30]").unwrap();
    assert_eq!(int_of(&interp.run("ret nums[0]").unwrap()), 10);
    assert_eq!(int_of(&interp.run("ret nums[-1]").unwrap()), 30);

    interp.run("nums[1] = 99").unwrap();
    assert_eq!(int_of(&interp.run("ret nums[1]").unwrap()), 99);
}

#[test]
fn list_methods() {
    let mut interp = Interpreter::new();
    interp.run("nums = [3, 1, 2]").unwrap();
    interp.run("nums.append(4)").unwrap();
    interp.run("nums.sort()").unwrap();
    let v = interp.run("ret nums").unwrap();
    let Value::List(items) = v else { panic!("expected list") };
    let ints: Vec<i64> = items.borrow().iter().map(int_of).collect();
    assert_eq!(ints, vec![1, 2, 3, 4]);
}

#[test]
fn map_applies_callback_to_each_element() {
    let mut interp = Interpreter::new();
    let v = interp.run("square = func(i) { ret i * i }\nret map(square, [1, 2, 3])").unwrap();
    let Value::List(items) = v else { panic!("expected list") };
    let ints: Vec<i64> = items.borrow().iter().map(int_of).collect();
    assert_eq!(ints, vec![1, 4, 9]);
}

#[test]
fn filter_keeps_elements_where_callback_is_truthy() {
    let mut interp = Interpreter::new();
    let v = interp.run("is_even = func(i) { ret i % 2 == 0 }\nret filter(is_even, [1, 2, 3, 4, 5])").unwrap();
    let Value::List(items) = v else { panic!("expected list") };
    let ints: Vec<i64> = items.borrow().iter().map(int_of).collect();
    assert_eq!(ints, vec![2, 4]);
}

#[test]
fn tuples_are_immutable_but_indexable() {
    let mut interp = Interpreter::new();
    interp.run("t = (1, 2, 3)").unwrap();
    assert_eq!(int_of(&interp.run("ret t[1]").unwrap()), 2);
    let err = interp.run("t[0] = 9").unwrap_err();
    match err {
        vela::Error::Runtime(v) => {
            let Value::Exception(e) = &*v else { panic!("expected exception") };
            assert_eq!(e.ty.name, "TypeError");
        }
        other => panic!("expected Error::Runtime, got {other:?}"),
    }
}

#[test]
fn dicts() {
    let mut interp = Interpreter::new();
    interp.run("data = {'name': 'Alice', 'age': 30}").unwrap();
    assert_eq!(run_str_on(&mut interp, "ret data['name']"), "Alice");
    assert_eq!(int_of(&interp.run("ret data['age']").unwrap()), 30);

    interp.run("data['age'] = 31").unwrap();
    assert_eq!(int_of(&interp.run("ret data['age']").unwrap()), 31);

    interp.run("data['city'] = 'NYC'").unwrap();
    assert_eq!(int_of(&interp.run("ret len(data)").unwrap()), 3);
}

fn run_str_on(interp: &mut Interpreter, src: &str) -> String {
    interp.run(src).unwrap().as_str().unwrap().to_string()
}

#[test]
fn dict_methods() {
    let mut interp = Interpreter::new();
    interp.run("d = {'a': 1}").unwrap();
    assert_eq!(int_of(&interp.run("ret d.get('a')").unwrap()), 1);
    assert_eq!(int_of(&interp.run("ret d.get('missing', -1)").unwrap()), -1);
    interp.run("d['b'] = 2").unwrap();
    let v = interp.run("ret d.keys()").unwrap();
    let Value::List(keys) = v else { panic!("expected list") };
    let keys: Vec<String> = keys.borrow().iter().map(|k| k.as_str().unwrap().to_string()).collect();
    assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn sets_support_membership_and_algebra() {
    let mut interp = Interpreter::new();
    interp.run("s = {1, 2, 3}").unwrap();
    assert_eq!(run_bool_on(&mut interp, "ret 2 in s"), true);
    assert_eq!(run_bool_on(&mut interp, "ret !(5 in s)"), true);
    interp.run("s.add(4)").unwrap();
    assert_eq!(int_of(&interp.run("ret len(s)").unwrap()), 4);
}

fn run_bool_on(interp: &mut Interpreter, src: &str) -> bool {
    match interp.run(src).unwrap() {
        Value::Bool(b) => b,
        other => panic!("expected bool, got {}", other.type_name()),
    }
}

#[test]
fn boolean_operators_use_symbols_not_keywords() {
    assert_eq!(run_bool("ret true && false"), false);
    assert_eq!(run_bool("ret true || false"), true);
    assert_eq!(run_bool("ret !true"), false);
}

#[test]
fn chained_comparison_evaluates_each_operand_once() {
    assert_eq!(run_bool("ret 1 < 2 < 3"), true);
    assert_eq!(run_bool("ret 1 < 2 > 5"), false);
}

#[test]
fn if_elif_else() {
    let src = r#"
x = 5
result = none
if x > 10 {
    result = 'big'
} elif x > 3 {
    result = 'medium'
} else {
    result = 'small'
}
ret result
"#;
    assert_eq!(run_str(src), "medium");
}

#[test]
fn while_loop_with_break_and_continue() {
    let src = r#"
total = 0
i = 0
while true {
    i = i + 1
    if i > 10 {
        break
    }
    if i % 2 == 0 {
        cont
    }
    total = total + i
}
ret total
"#;
    // sum of odd numbers 1..=9
    assert_eq!(run_int(src), 25);
}

#[test]
fn for_loop_over_range() {
    let src = r#"
total = 0
for i in range(5) {
    total = total + i
}
ret total
"#;
    assert_eq!(run_int(src), 10);
}

#[test]
fn for_loop_destructures_tuples() {
    let src = r#"
total = 0
for (a, b) in [(1, 2), (3, 4)] {
    total = total + a * b
}
ret total
"#;
    assert_eq!(run_int(src), 1 * 2 + 3 * 4);
}

#[test]
fn tuple_destructuring_assignment() {
    let mut interp = Interpreter::new();
    interp.run("(a, b) = (1, 2)").unwrap();
    assert_eq!(int_of(&interp.run("ret a").unwrap()), 1);
    assert_eq!(int_of(&interp.run("ret b").unwrap()), 2);
}

#[test]
fn functions_are_expressions_not_auto_bound() {
    // A bare `func NAME(...) { }` statement is an expression statement:
    // its value is computed and discarded, it does not bind `NAME`.
    let err = Interpreter::new().run("func greet(name) { ret name }\nret greet('x')").unwrap_err();
    assert!(matches!(err, vela::Error::Runtime(_)));
}

#[test]
fn explicit_binding_of_a_func_literal_works() {
    let src = r#"
greet = func(name) { ret 'hi ' + name }
ret greet('Ada')
"#;
    assert_eq!(run_str(src), "hi Ada");
}

#[test]
fn closures_capture_enclosing_locals() {
    let src = r#"
make_adder = func(n) {
    ret func(x) { ret x + n }
}
add5 = make_adder(5)
ret add5(10)
"#;
    assert_eq!(run_int(src), 15);
}

#[test]
fn recursive_named_func_literal() {
    let src = r#"
fact = func fact(n) {
    if n <= 1 {
        ret 1
    }
    ret n * fact(n - 1)
}
ret fact(5)
"#;
    assert_eq!(run_int(src), 120);
}

#[test]
fn default_and_variadic_parameters() {
    let src = r#"
greet = func(name, greeting = 'hi') { ret greeting + ' ' + name }
ret greet('Bob')
"#;
    assert_eq!(run_str(src), "hi Bob");

    let src2 = r#"
total = func(*nums) {
    acc = 0
    for n in nums { acc = acc + n }
    ret acc
}
ret total(1, 2, 3, 4)
"#;
    assert_eq!(run_int(src2), 10);
}

#[test]
fn lambda_sugar() {
    assert_eq!(run_int("square = x -> x * x\nret square(6)"), 36);
    assert_eq!(run_int("add = (a, b) -> a + b\nret add(2, 3)"), 5);
}

#[test]
fn ternary_expression() {
    assert_eq!(run_str("x = 5\nret 'big' if x > 3 else 'small'"), "big");
}

#[test]
fn null_coalesce() {
    assert_eq!(run_int("x = none\nret x ?? 42"), 42);
    assert_eq!(run_int("x = 7\nret x ?? 42"), 7);
}

#[test]
fn user_type_with_init_and_attributes() {
    let src = r#"
type Point {
    init = func(self, x, y) {
        self.x = x
        self.y = y
    }
}
p = Point(3, 4)
ret p.x + p.y
"#;
    assert_eq!(run_int(src), 7);
}

#[test]
fn user_type_methods_called_through_the_type() {
    let src = r#"
type Counter {
    init = func(self, start) { self.n = start }
    bump = func(self, by) { self.n = self.n + by }
}
c = Counter(10)
Counter.bump(c, 5)
ret c.n
"#;
    assert_eq!(run_int(src), 15);
}

#[test]
fn user_type_inheritance_via_extends() {
    let src = r#"
type Animal {
    init = func(self, name) { self.name = name }
    speak = func(self) { ret self.name + ' makes a sound' }
}
type Dog extends Animal {
    speak = func(self) { ret self.name + ' barks' }
}
d = Dog('Rex')
ret Dog.speak(d)
"#;
    assert_eq!(run_str(src), "Rex barks");
}

#[test]
fn isinstance_walks_the_base_chain() {
    let src = r#"
type Animal { }
type Dog extends Animal { }
d = Dog()
ret isinstance(d, Animal)
"#;
    assert_eq!(run_bool(src), true);
}

#[test]
fn eq_slot_overload_is_dispatched() {
    let src = r#"
type Point {
    init = func(self, x, y) { self.x = x; self.y = y }
    eq = func(a, b) { ret a.x == b.x && a.y == b.y }
}
ret Point(1, 2) == Point(1, 2)
"#;
    assert_eq!(run_bool(src), true);
}

#[test]
fn add_slot_overload_is_dispatched() {
    let src = r#"
type Vec2 {
    init = func(self, x, y) { self.x = x; self.y = y }
    add = func(a, b) { ret Vec2(a.x + b.x, a.y + b.y) }
}
v = Vec2(1, 2) + Vec2(10, 20)
ret v.x + v.y
"#;
    assert_eq!(run_int(src), 33);
}

#[test]
fn try_catch_recovers_from_math_error() {
    let src = r#"
result = none
try {
    x = 1 / 0
} catch MathError as e {
    result = 'caught'
}
ret result
"#;
    assert_eq!(run_str(src), "caught");
}

#[test]
fn try_catch_does_not_match_unrelated_type() {
    let src = r#"
try {
    x = 1 / 0
} catch KeyError {
    ret 'wrong'
}
ret 'unreachable'
"#;
    assert_eq!(run_exc_name(src), "MathError");
}

#[test]
fn finally_runs_on_both_paths() {
    let src = r#"
log = []
try {
    log.append('try')
    throw ValError('bad')
} catch ValError {
    log.append('catch')
} finally {
    log.append('finally')
}
ret log
"#;
    let mut interp = Interpreter::new();
    let v = interp.run(src).unwrap();
    let Value::List(items) = v else { panic!("expected list") };
    let items: Vec<String> = items.borrow().iter().map(|s| s.as_str().unwrap().to_string()).collect();
    assert_eq!(items, vec!["try".to_string(), "catch".to_string(), "finally".to_string()]);
}

#[test]
fn finally_runs_even_when_rethrown() {
    let src = r#"
ran_finally = false
try {
    try {
        throw KeyError('missing')
    } finally {
        ran_finally = true
    }
} catch KeyError {
}
ret ran_finally
"#;
    assert_eq!(run_bool(src), true);
}

#[test]
fn index_error_on_out_of_range_list_access() {
    assert_eq!(run_exc_name("x = [1, 2]\nret x[5]"), "IndexError");
}

#[test]
fn key_error_on_missing_dict_key() {
    assert_eq!(run_exc_name("d = {}\nret d['missing']"), "KeyError");
}

#[test]
fn name_error_on_undefined_variable() {
    assert_eq!(run_exc_name("ret totally_undefined_name"), "NameError");
}

#[test]
fn attr_error_on_unknown_attribute() {
    let src = r#"
type Empty { }
e = Empty()
ret e.nope
"#;
    assert_eq!(run_exc_name(src), "AttrError");
}

#[test]
fn type_error_on_bad_operand() {
    assert_eq!(run_exc_name("ret 1 + 'a'"), "TypeError");
}

#[test]
fn arg_error_on_wrong_method_arity() {
    assert_eq!(run_exc_name("x = [1]\nret x.append(1, 2)"), "ArgError");
}

#[test]
fn assert_failure_raises_assert_error() {
    assert_eq!(run_exc_name("assert 1 == 2"), "AssertError");
}

#[test]
fn assert_success_is_silent() {
    let mut interp = Interpreter::new();
    interp.run("assert 1 == 1").unwrap();
}

#[test]
fn user_thrown_exception_is_catchable_by_its_own_type() {
    let src = r#"
type BankError extends Error { }
try {
    throw BankError('insufficient funds')
} catch BankError as e {
    ret e.message
}
"#;
    assert_eq!(run_str(src), "insufficient funds");
}

#[test]
fn user_exception_subtype_caught_by_base_clause() {
    let src = r#"
type BankError extends Error { }
try {
    throw BankError('nope')
} catch Error {
    ret 'caught as base'
}
"#;
    assert_eq!(run_str(src), "caught as base");
}

#[test]
fn catch_all_clause_matches_anything() {
    let src = r#"
try {
    throw ValError('x')
} catch {
    ret 'caught'
}
"#;
    assert_eq!(run_str(src), "caught");
}

#[test]
fn builtins_cover_the_core_set() {
    assert_eq!(run_int("ret len([1, 2, 3])"), 3);
    assert_eq!(run_int("ret abs(-7)"), 7);
    assert_eq!(run_int("ret max(1, 5, 3)"), 5);
    assert_eq!(run_int("ret min(1, 5, 3)"), 1);
    assert_eq!(run_int("ret sum([1, 2, 3, 4])"), 10);
    assert_eq!(run_bool("ret all([true, true, true])"), true);
    assert_eq!(run_bool("ret any([false, false, true])"), true);
    assert_eq!(run_str("ret str(42)"), "42");
    assert_eq!(run_int("ret int('42')"), 42);
}

#[test]
fn enumerate_and_zip() {
    let src = r#"
pairs = []
for (i, v) in enumerate(['a', 'b']) {
    pairs.append((i, v))
}
ret pairs[1][1]
"#;
    assert_eq!(run_str(src), "b");

    let src2 = r#"
total = 0
for (a, b) in zip([1, 2, 3], [10, 20, 30]) {
    total = total + a * b
}
ret total
"#;
    assert_eq!(run_int(src2), 1 * 10 + 2 * 20 + 3 * 30);
}

#[test]
fn print_output_is_captured() {
    let mut interp = Interpreter::new();
    let out = interp.capture("print('hello', 'world')\nprint(42)").unwrap();
    assert_eq!(out.output, vec!["hello world".to_string(), "42".to_string()]);
}

#[test]
fn resource_limit_caps_instruction_count() {
    let mut interp = Interpreter::new();
    interp.limit(vela::Limits { max_instructions: Some(100), max_recursion_depth: None });
    let err = interp.run("x = 0\nwhile true { x = x + 1 }").unwrap_err();
    assert!(matches!(err, vela::Error::InstructionLimitExceeded));
}

#[test]
fn resource_limit_caps_recursion_depth() {
    let mut interp = Interpreter::new();
    interp.limit(vela::Limits { max_instructions: None, max_recursion_depth: Some(50) });
    let src = r#"
recurse = func recurse(n) { ret recurse(n + 1) }
ret recurse(0)
"#;
    let err = interp.run(src).unwrap_err();
    assert!(matches!(err, vela::Error::RecursionLimitExceeded));
}

#[test]
fn host_registered_module_is_importable() {
    let mut interp = Interpreter::new();
    interp.module("greetings", |b| {
        b.constant("DEFAULT", Value::str("hello"));
        b.function("shout", |args| Ok(Value::str(args[0].as_str().unwrap().to_uppercase())));
    });
    let src = r#"
import greetings
ret greetings.shout(greetings.DEFAULT)
"#;
    assert_eq!(run_str_on(&mut interp, src), "HELLO");
}

#[test]
fn host_set_globals_are_visible_to_source() {
    let mut interp = Interpreter::new();
    interp.set("seed", Value::int(7));
    assert_eq!(int_of(&interp.run("ret seed * 6").unwrap()), 42);
}
