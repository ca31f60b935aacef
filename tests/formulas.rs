use plc::{
    ast::Category,
    compile::compile_expression,
    encode::{decode, encode},
    parse::parse_str,
    sim::Simulator,
};
use proptest::prelude::*;

const NAMES: [&str; 4] = ["a", "b", "c", "d"];

#[derive(Debug, Clone)]
enum Formula {
    Var(usize),
    Not(Box<Formula>),
    And(Box<Formula>, Box<Formula>),
    Or(Box<Formula>, Box<Formula>),
}

impl Formula {
    fn eval(&self, inputs: &[bool; 4]) -> bool {
        match self {
            Formula::Var(index) => inputs[*index],
            Formula::Not(inner) => !inner.eval(inputs),
            Formula::And(left, right) => left.eval(inputs) && right.eval(inputs),
            Formula::Or(left, right) => left.eval(inputs) || right.eval(inputs),
        }
    }

    /// Con paréntesis solo donde la precedencia los exige.
    fn render(&self, context: u8) -> String {
        let (text, level) = match self {
            Formula::Var(index) => return String::from(NAMES[*index]),
            Formula::Not(inner) => return format!("!{}", inner.render(2)),
            Formula::Or(left, right) => (format!("{} | {}", left.render(0), right.render(0)), 0),
            Formula::And(left, right) => (format!("{} & {}", left.render(1), right.render(1)), 1),
        };

        if context > level {
            format!("({})", text)
        } else {
            text
        }
    }

    /// Con paréntesis en todo nodo binario.
    fn render_grouped(&self) -> String {
        match self {
            Formula::Var(index) => String::from(NAMES[*index]),
            Formula::Not(inner) => format!("!{}", inner.render_grouped()),
            Formula::Or(left, right) => format!("({} | {})", left.render_grouped(), right.render_grouped()),
            Formula::And(left, right) => format!("({} & {})", left.render_grouped(), right.render_grouped()),
        }
    }
}

fn formula() -> impl Strategy<Value = Formula> {
    let leaf = (0..NAMES.len()).prop_map(Formula::Var);
    leaf.prop_recursive(6, 48, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|formula| Formula::Not(Box::new(formula))),
            (inner.clone(), inner.clone())
                .prop_map(|(left, right)| Formula::And(Box::new(left), Box::new(right))),
            (inner.clone(), inner)
                .prop_map(|(left, right)| Formula::Or(Box::new(left), Box::new(right))),
        ]
    })
}

/// Compila `out = source;` y compara contra la fórmula en las 16 combinaciones.
fn check(source: &str, formula: &Formula) -> Result<(), TestCaseError> {
    let text = format!("Inputs: a=0, b=1, c=2, d=3; Outputs: out=0; out = {};", source);
    let program = parse_str(&text).map_err(|error| TestCaseError::fail(format!("{:?}", error.val())))?;
    let expression = program
        .equation_of("out")
        .map_err(|error| TestCaseError::fail(error.to_string()))?;

    let mut operations = Vec::new();
    compile_expression(program.symbols(), expression, |operation| operations.push(operation))
        .map_err(|error| TestCaseError::fail(error.to_string()))?;

    let image = encode(&operations).map_err(|error| TestCaseError::fail(error.to_string()))?;
    prop_assert_eq!(decode(&image), Ok(operations.clone()));

    let mut simulator = Simulator::new(4, 1, 0, 0);
    for bits in 0u32..16 {
        let inputs = [0, 1, 2, 3].map(|index| bits >> index & 1 == 1);

        simulator.reset_all();
        for (index, &value) in inputs.iter().enumerate() {
            simulator.set(Category::Input, index as u32, value).unwrap();
        }

        prop_assert_eq!(simulator.execute::<64>(&operations), Ok(formula.eval(&inputs)), "{}", source);
    }

    Ok(())
}

proptest! {
    #[test]
    fn formula_when_minimally_parenthesized_then_matches_reference(formula in formula()) {
        check(&formula.render(0), &formula)?;
    }

    #[test]
    fn formula_when_fully_parenthesized_then_matches_reference(formula in formula()) {
        check(&formula.render_grouped(), &formula)?;
    }
}
