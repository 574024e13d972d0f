//! Line assembly and weight extraction tests

use uart_link::extract_weight;
use uart_link::line::{LineAssembler, LinePush};

fn lines<const N: usize>(asm: &mut LineAssembler<N>, bytes: &[u8]) -> Vec<Result<String, ()>> {
    let mut out = Vec::new();
    for &b in bytes {
        match asm.push(b) {
            Some(LinePush::Line(line)) => out.push(Ok(String::from_utf8_lossy(line).into_owned())),
            Some(LinePush::Overflow) => out.push(Err(())),
            None => {}
        }
    }
    out
}

fn ok(s: &str) -> Result<String, ()> {
    Ok(s.to_string())
}

#[test]
fn test_crlf_yields_one_line() {
    let mut asm = LineAssembler::<32>::new();
    assert_eq!(lines(&mut asm, b"ST,GS, 0.80 kg\r\n"), vec![ok("ST,GS, 0.80 kg")]);
    assert!(asm.is_empty());
}

#[test]
fn test_line_split_across_reads() {
    let mut asm = LineAssembler::<32>::new();
    assert!(lines(&mut asm, b"W: 1").is_empty());
    assert_eq!(asm.as_bytes(), b"W: 1");
    assert_eq!(lines(&mut asm, b"2.5\n"), vec![ok("W: 12.5")]);
}

#[test]
fn test_budget_is_inclusive() {
    let mut asm = LineAssembler::<4>::new();
    assert_eq!(lines(&mut asm, b"1234\n"), vec![ok("1234")]);
    assert_eq!(lines(&mut asm, b"12345\nok\n"), vec![Err(()), ok("ok")]);
}

#[test]
fn test_clear_drops_partial_line() {
    let mut asm = LineAssembler::<16>::new();
    lines(&mut asm, b"garbage");
    asm.clear();
    assert_eq!(lines(&mut asm, b"W: 3.0\n"), vec![ok("W: 3.0")]);
    assert_eq!(asm.capacity(), 16);
}

#[test]
fn test_extract_from_assembled_lines() {
    let mut asm = LineAssembler::<64>::new();
    let extracted: Vec<String> = lines(&mut asm, b"W: 12.50 kg\r\nW:  7 kg\r\nOVERLOAD\r\n")
        .into_iter()
        .flatten()
        .map(|line| extract_weight("W:(#)", &line).to_string())
        .collect();
    assert_eq!(extracted, ["12.50", "7", ""]);
}
