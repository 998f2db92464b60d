//! End-to-end tests: MicroC source in, printed output and status out.

use mcc_vm::{Engine, EngineError, Execution};
use pretty_assertions::assert_eq;

fn run(source: &str, arg: i64) -> Execution {
    Engine::default()
        .run_source(source, arg)
        .unwrap_or_else(|err| panic!("program failed: {}", err))
}

fn run_err(source: &str, arg: i64) -> EngineError {
    Engine::default()
        .run_source(source, arg)
        .expect_err("program unexpectedly succeeded")
}

#[test]
fn countdown() {
    let source = "
void main(int n) {
    while (n > 0) {
        print n;
        n = n - 1;
    }
}";
    assert_eq!(run(source, 10).output, "10 9 8 7 6 5 4 3 2 1 ");
    assert_eq!(run(source, 0).output, "");
}

#[test]
fn pointer_aliasing() {
    let source = "
void main(int n) {
    int i;
    int *p;
    i = 7;
    p = &i;
    *p = *p + 10;
    print i;
    print p == &i;
}";
    assert_eq!(run(source, 0).output, "17 1 ");
}

#[test]
fn array_fill_and_read_back() {
    let source = "
void main(int n) {
    int i;
    int a[10];
    i = 0;
    while (i < n) {
        a[i] = i;
        i = i + 1;
    }
    i = 0;
    while (i < n) {
        print a[i];
        i = i + 1;
    }
}";
    assert_eq!(run(source, 10).output, "0 1 2 3 4 5 6 7 8 9 ");
}

#[test]
fn factorial_through_global() {
    let source = "
int r;

void fac(int n) {
    if (n == 0)
        r = 1;
    else {
        fac(n - 1);
        r = n * r;
    }
}

void main(int n) {
    int i;
    i = 0;
    while (i < n) {
        fac(i);
        print r;
        i = i + 1;
    }
}";
    assert_eq!(
        run(source, 10).output,
        "1 1 2 6 24 120 720 5040 40320 362880 "
    );
}

#[test]
fn factorial_through_return_values() {
    let source = "
int fac(int n) {
    if (n == 0)
        return 1;
    else
        return n * fac(n - 1);
}

void main(int n) {
    int i;
    i = 0;
    while (i < n) {
        print fac(i);
        i = i + 1;
    }
    print n;
}";
    assert_eq!(run(source, 5).output, "1 1 2 6 24 5 ");
}

#[test]
fn square_then_echo() {
    let source = "void main(int n) { print n * n; print n; }";
    assert_eq!(run(source, 10).output, "100 10 ");
    assert_eq!(run(source, 0).output, "0 0 ");
}

#[test]
fn integer_square_root_search() {
    // Least r with r * r >= n
    let source = "
int r;

void main(int n) {
    r = 0;
    while (r * r < n)
        r = r + 1;
    print r;
}";
    assert_eq!(run(source, 1).output, "1 ");
    assert_eq!(run(source, 4).output, "2 ");
    assert_eq!(run(source, 10).output, "4 ");
}

#[test]
fn swap_through_pointer_parameters() {
    let source = "
void swap(int *p, int *q) {
    int tmp;
    tmp = *p;
    *p = *q;
    *q = tmp;
}

void main(int n) {
    int a;
    int b;
    a = n;
    b = 1;
    swap(&a, &b);
    print a;
    print b;
}";
    assert_eq!(run(source, 2).output, "1 2 ");
}

#[test]
fn branch_fallthrough() {
    let source = "
void main(int n) {
    if (n == 0)
        print 1111;
    print 2222;
}";
    assert_eq!(run(source, 0).output, "1111 2222 ");
    assert_eq!(run(source, 1).output, "2222 ");
}

#[test]
fn leap_years() {
    let source = "
void main(int n) {
    int y;
    y = n - 30;
    while (y <= n) {
        if (y % 4 == 0 && (y % 100 != 0 || y % 400 == 0))
            print y;
        y = y + 1;
    }
}";
    assert_eq!(
        run(source, 1920).output,
        "1892 1896 1904 1908 1912 1916 1920 "
    );
}

#[test]
fn fibonacci_pairs_per_line() {
    let source = "
int fib(int n) {
    if (n < 2)
        return 1;
    return fib(n - 1) + fib(n - 2);
}

void main(int n) {
    int i;
    i = 0;
    while (i < n) {
        print i;
        print fib(i);
        println;
        i = i + 1;
    }
}";
    let expected = "0 1 \n1 1 \n2 2 \n3 3 \n4 5 \n5 8 \n6 13 \n7 21 \n8 34 \n9 55 \n";
    assert_eq!(run(source, 10).output, expected);
}

#[test]
fn pointer_arithmetic() {
    let source = "
void main(int n) {
    int a[10];
    int *p;
    int i;
    i = 0;
    while (i < 10) {
        a[i] = i * i;
        i = i + 1;
    }
    p = a;
    print *(p + 3);
    print p[4];
    print *(a + 9) - *a;
    print (p + 7) - p;
}";
    assert_eq!(run(source, 0).output, "9 16 81 7 ");
}

#[test]
fn two_dimensional_arrays_and_row_pointers() {
    let source = "
void main(int n) {
    int m[3][4];
    int (*row)[4];
    int i;
    int j;
    i = 0;
    while (i < 3) {
        j = 0;
        while (j < 4) {
            m[i][j] = i * 10 + j;
            j = j + 1;
        }
        i = i + 1;
    }
    row = &m[1];
    print (*row)[2];
    print m[2][3];
}";
    assert_eq!(run(source, 0).output, "12 23 ");
}

#[test]
fn two_dimensional_elements_do_not_alias() {
    let source = "
void main(int n) {
    int m[2][4];
    m[0][3] = 7;
    m[1][0] = 9;
    print m[0][3];
    print m[1][0];
}";
    assert_eq!(run(source, 0).output, "7 9 ");
}

#[test]
fn function_pointers() {
    let source = "
int square(int x) { return x * x; }
int twice(int x) { return x + x; }

int apply(int (*f)(int), int x) {
    return f(x);
}

void main(int n) {
    int (*g)(int);
    g = square;
    print apply(g, n);
    print apply(twice, n);
    print (*g)(n);
}";
    assert_eq!(run(source, 5).output, "25 10 25 ");
}

#[test]
fn short_circuit_evaluation() {
    let source = "
int g;

int set(int v) {
    g = v;
    return v;
}

int main(int n) {
    g = 0;
    if (n > 0 || set(5) > 0) { }
    print g;
    if (n > 0 && set(7) > 0) { }
    print g;
    return 0;
}";
    assert_eq!(run(source, 1).output, "0 7 ");
    assert_eq!(run(source, 0).output, "5 5 ");
}

const QUEENS: &str = "
int n;
int pos[13];

int ok(int col, int row) {
    int i;
    i = 1;
    while (i < col) {
        if (pos[i] == row)
            return 0;
        if (pos[i] - i == row - col)
            return 0;
        if (pos[i] + i == row + col)
            return 0;
        i = i + 1;
    }
    return 1;
}

void search(int col) {
    int row;
    if (col > n) {
        int i;
        i = 1;
        while (i <= n) {
            print pos[i];
            i = i + 1;
        }
        println;
        return;
    }
    row = 1;
    while (row <= n) {
        if (ok(col, row)) {
            pos[col] = row;
            search(col + 1);
        }
        row = row + 1;
    }
}

void main(int arg) {
    n = arg;
    search(1);
}";

#[test]
fn n_queens_solutions_are_valid() {
    let board = 6;
    let output = run(QUEENS, board).output;
    let solutions: Vec<Vec<i64>> = output
        .lines()
        .map(|line| {
            line.split_whitespace()
                .map(|word| word.parse().unwrap())
                .collect()
        })
        .collect();

    // Six queens has exactly four solutions
    assert_eq!(solutions.len(), 4);
    for solution in &solutions {
        assert_eq!(solution.len(), board as usize);
        for col_a in 0..solution.len() {
            for col_b in (col_a + 1)..solution.len() {
                let (ra, rb) = (solution[col_a], solution[col_b]);
                let dc = (col_b - col_a) as i64;
                assert_ne!(ra, rb, "rows clash in {:?}", solution);
                assert_ne!((ra - rb).abs(), dc, "diagonals clash in {:?}", solution);
            }
        }
    }
}

#[test]
fn eleven_queens_exercises_deep_recursion() {
    let output = run(QUEENS, 11).output;
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 2680);
    assert_eq!(lines[0], "1 3 5 7 9 11 2 4 6 8 10 ");
}

#[test]
fn argument_threading() {
    let source = "int main(int n) { return n; }";
    assert_eq!(run(source, 37).status, 37);
    assert_eq!(run(source, 0).status, 0);
}

#[test]
fn indexing_matches_pointer_offset_everywhere() {
    let source = "
void main(int n) {
    int a[10];
    int k;
    k = 0;
    while (k < 10) {
        a[k] = k * 3;
        k = k + 1;
    }
    k = 0;
    while (k < 10) {
        if (a[k] == *(a + k))
            print 1;
        else
            print 0;
        k = k + 1;
    }
}";
    assert_eq!(run(source, 0).output, "1 1 1 1 1 1 1 1 1 1 ");
}

#[test]
fn exit_status_is_return_value() {
    let result = run("int main(int n) { return 17; }", 0);
    assert_eq!(result.status, 17);
    assert_eq!(result.output, "");
}

#[test]
fn void_main_exits_zero() {
    assert_eq!(run("void main() { }", 0).status, 0);
    assert_eq!(run("void main(int n) { println; }", 0).output, "\n");
}

#[test]
fn global_initializers_run_before_main() {
    let source = "
int base = 100;
int scale;

int main(int n) {
    scale = 3;
    return base + scale * n;
}";
    assert_eq!(run(source, 5).status, 115);
}

#[test]
fn for_loop_sum() {
    let source = "
int main(int n) {
    int s;
    s = 0;
    for (int i = 0; i < n; i = i + 1)
        s = s + i;
    return s;
}";
    assert_eq!(run(source, 10).status, 45);
}

#[test]
fn shadowing_uses_innermost_binding() {
    let source = "
int main(int n) {
    int x;
    x = 1;
    {
        int x;
        x = 2;
        print x;
    }
    print x;
    return x;
}";
    let result = run(source, 0);
    assert_eq!(result.output, "2 1 ");
    assert_eq!(result.status, 1);
}

#[test]
fn recursion_threads_the_argument() {
    let source = "
int sum(int n) {
    if (n == 0)
        return 0;
    return n + sum(n - 1);
}

int main(int n) {
    return sum(n);
}";
    assert_eq!(run(source, 100).status, 5050);
}

#[test]
fn runs_are_deterministic() {
    let source = "
void main(int n) {
    int i;
    for (i = 0; i < n; i = i + 1)
        print i * i % 7;
}";
    let first = run(source, 50);
    let second = run(source, 50);
    assert_eq!(first, second);
}

#[test]
fn division_by_zero_is_a_runtime_fault() {
    let err = run_err("int main(int n) { return 10 / n; }", 0);
    assert!(matches!(err, EngineError::Runtime(_)));
}

#[test]
fn compile_errors_are_reported_not_run() {
    let err = run_err("int main(int n) { return undeclared; }", 0);
    assert!(matches!(err, EngineError::Compile(_)));
}
