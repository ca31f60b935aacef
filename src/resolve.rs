//! Resolución de dependencias entre ecuaciones.
//!
//! Resolver una señal produce una copia de su ecuación en la cual cada
//! referencia a otra variable con ecuación propia se sustituye, en forma
//! recursiva, por una copia de dicha ecuación. Los usos repetidos de una
//! misma señal se dejan sin expandir según un mapa de visitas que provee
//! quien invoca, de forma que varias resoluciones pueden compartirlo.

use std::collections::HashMap;

use log::{debug, trace};

use crate::{
    ast::{
        Category, Expression, Operand, Operator, Program, SemanticError, Term, VarId, MAX_DEPTH,
    },
    lex::Identifier,
};

/// Conteo de visitas por nombre de variable.
pub type Visits = HashMap<Identifier, u32>;

impl Program {
    /// Resuelve las dependencias de la señal `name`.
    ///
    /// Si no se provee un mapa de visitas, se utiliza uno nuevo que se
    /// descarta al terminar. El resultado es un árbol nuevo; el programa
    /// no se modifica, excepto por los identificadores de expresión que
    /// se reservan para envolver monoflops.
    pub fn resolve_dependencies(
        &self,
        name: &str,
        visits: Option<&mut Visits>,
    ) -> Result<Expression, SemanticError> {
        let variable = self.symbols().lookup(name)?;

        let mut scratch = Visits::new();
        let visits = visits.unwrap_or(&mut scratch);

        let mut resolver = Resolver {
            program: self,
            visits,
            path: Vec::new(),
            root: variable,
        };

        let resolved = resolver.root()?;
        debug!("resolved `{}`: {}", name, self.display(&resolved));

        Ok(resolved)
    }

    /// Resuelve varias señales compartiendo un mismo mapa de visitas.
    pub fn resolve_many<'n, I>(&self, names: I) -> Result<Vec<Expression>, SemanticError>
    where
        I: IntoIterator<Item = &'n str>,
    {
        let mut visits = Visits::new();
        names
            .into_iter()
            .map(|name| self.resolve_dependencies(name, Some(&mut visits)))
            .collect()
    }

    /// Resuelve todas las ecuaciones, en orden de declaración.
    pub fn resolve_all(&self) -> Result<Vec<Expression>, SemanticError> {
        let names: Vec<Identifier> = self
            .equations()
            .map(|(variable, _)| variable.name().clone())
            .collect();

        self.resolve_many(names.iter().map(AsRef::as_ref))
    }
}

struct Resolver<'a> {
    program: &'a Program,
    visits: &'a mut Visits,
    path: Vec<VarId>,
    root: VarId,
}

impl Resolver<'_> {
    fn root(&mut self) -> Result<Expression, SemanticError> {
        let program = self.program;
        let root = program.variable(self.root);

        let mut resolved = program
            .equation(self.root)
            .ok_or_else(|| SemanticError::MissingEquation(root.name().clone()))?
            .clone();

        self.path.push(self.root);
        self.expand(&mut resolved, 0)?;
        self.path.pop();

        resolved.pull_up_first_term();
        Ok(resolved)
    }

    fn expand(&mut self, expression: &mut Expression, depth: usize) -> Result<(), SemanticError> {
        if depth >= MAX_DEPTH {
            let name = self.program.variable(self.root).name().clone();
            return Err(SemanticError::NestingTooDeep(name));
        }

        for term in expression.terms_mut() {
            match term.operand_mut() {
                Operand::Expression(inner) => self.expand(inner, depth + 1)?,
                Operand::Identifier(variable) => {
                    let variable = *variable;
                    if let Some(replacement) = self.inline(variable, depth)? {
                        *term.operand_mut() = Operand::Expression(Box::new(replacement));
                    }
                }

                Operand::Empty => (),
            }
        }

        Ok(())
    }

    /// Copia de la ecuación de `id`, o `None` si la referencia se conserva.
    fn inline(&mut self, id: VarId, depth: usize) -> Result<Option<Expression>, SemanticError> {
        let program = self.program;
        let dependency = match program.equation(id) {
            Some(dependency) => dependency,
            None => return Ok(None),
        };

        let variable = program.variable(id);
        if self.path.contains(&id) {
            return Err(SemanticError::CyclicDependency(variable.name().clone()));
        }

        let visits = self.visits.entry(variable.name().clone()).or_insert(0);
        *visits += 1;

        if *visits > 1 {
            trace!("`{}` already expanded, keeping reference", variable.name());
            return Ok(None);
        }

        let monoflop = variable.category() == Category::Monoflop;
        let mut replacement = if dependency.terms().len() == 1 {
            // Un único término pierde su operador, excepto tras un monoflop
            let operator = if monoflop {
                Operator::Timer
            } else {
                Operator::None
            };

            Expression::with_term(dependency.id(), dependency.terms()[0].clone(), operator)
        } else {
            let mut copy = Expression::new(dependency.id());
            copy.set_operator(dependency.operator());
            for term in dependency.terms() {
                copy.add_term(term.clone());
            }

            if monoflop {
                copy.set_variable(Some(id));
                Expression::with_term(program.next_id(), Term::expression(copy), Operator::Timer)
            } else {
                copy
            }
        };

        replacement.set_variable(Some(id));
        trace!("expanding `{}` as {}", variable.name(), replacement.id());

        self.path.push(id);
        self.expand(&mut replacement, depth + 1)?;
        self.path.pop();

        Ok(Some(replacement))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        ast::{Assignment, Unary},
        parse::parse_str,
    };

    const HEADER: &str = "Inputs: a=0, b=1, c=2;\nOutputs: out=0, other=1;\nFlags: f=0, g=1;\nMonoflops: t(4s)=0;\n";

    fn program(body: &str) -> Program {
        parse_str(&format!("{}{}", HEADER, body)).unwrap()
    }

    fn resolve(program: &Program, name: &str) -> Expression {
        program.resolve_dependencies(name, None).unwrap()
    }

    #[test]
    fn resolve_when_reference_has_equation_then_inlined_with_identity() {
        let program = program("f = a & b; out = f | c;");
        let f_id = program.equation_of("f").unwrap().id();
        let f = program.symbols().lookup("f").unwrap();

        let resolved = resolve(&program, "out");
        assert_eq!(resolved.operator(), Operator::Or);

        let inlined = resolved.terms()[0].sub_expression().unwrap();
        assert_eq!(inlined.id(), f_id);
        assert_eq!(inlined.variable(), Some(f));
        assert_eq!(inlined.operator(), Operator::And);
        assert_eq!(program.display(&resolved).to_string(), "(a & b) | c");
    }

    #[test]
    fn resolve_when_reference_is_input_then_kept() {
        let program = program("out = a | b;");

        let resolved = resolve(&program, "out");
        assert_eq!(&resolved, program.equation_of("out").unwrap());
    }

    #[test]
    fn resolve_when_single_term_dependency_then_operator_collapsed() {
        let program = program("f = !a; out = f & b;");

        let resolved = resolve(&program, "out");
        let inlined = resolved.terms()[0].sub_expression().unwrap();

        assert_eq!(inlined.operator(), Operator::None);
        assert_eq!(inlined.terms().len(), 1);
        assert_eq!(inlined.terms()[0].unary(), Unary::Not);
    }

    #[test]
    fn resolve_when_single_term_monoflop_then_timer_marker() {
        let program = program("t += a; out = t & b;");

        let resolved = resolve(&program, "out");
        let inlined = resolved.terms()[0].sub_expression().unwrap();

        assert_eq!(inlined.operator(), Operator::Timer);
        assert_eq!(inlined.terms().len(), 1);
    }

    #[test]
    fn resolve_when_compound_monoflop_then_wrapped_in_timer() {
        let program = program("t += a | b; out = t & c;");
        let t_id = program.equation_of("t").unwrap().id();

        let resolved = resolve(&program, "out");
        let timer = resolved.terms()[0].sub_expression().unwrap();
        assert_eq!(timer.operator(), Operator::Timer);
        assert_ne!(timer.id(), t_id);

        let inner = timer.terms()[0].sub_expression().unwrap();
        assert_eq!(inner.id(), t_id);
        assert_eq!(inner.operator(), Operator::Or);
    }

    #[test]
    fn resolve_when_inverted_reference_then_inversion_preserved() {
        let program = program("f = a & b; out = !f | c;");

        let resolved = resolve(&program, "out");
        assert_eq!(resolved.terms()[0].unary(), Unary::Not);
        assert!(resolved.terms()[0].sub_expression().is_some());
    }

    #[test]
    fn resolve_when_signal_used_twice_then_second_use_unexpanded() {
        let program = program("f = a & b; out = f | !f;");
        let f = program.symbols().lookup("f").unwrap();

        let resolved = resolve(&program, "out");
        assert!(resolved.terms()[0].sub_expression().is_some());
        assert_eq!(resolved.terms()[1].variable(), Some(f));
        assert_eq!(resolved.terms()[1].unary(), Unary::Not);
    }

    #[test]
    fn resolve_when_visits_shared_then_later_signals_keep_reference() {
        let program = program("f = a & b; out = f | c; other = f & c;");
        let mut visits = Visits::new();

        let out = program.resolve_dependencies("out", Some(&mut visits)).unwrap();
        let other = program.resolve_dependencies("other", Some(&mut visits)).unwrap();

        assert!(out.terms()[0].sub_expression().is_some());
        assert!(other.terms()[0].variable().is_some());
        assert_eq!(visits[&Identifier::from("f")], 2);
    }

    #[test]
    fn resolve_when_transitive_dependencies_then_fully_inlined() {
        let program = program("g = a | b; f = g & c; out = !f;");

        let resolved = resolve(&program, "out");
        let mut inputs = HashMap::new();
        resolved.count_inputs(&mut inputs);

        assert_eq!(inputs.len(), 3);
        assert!(resolved.count_levels() >= 3);
    }

    #[test]
    fn resolve_when_root_is_redundant_group_then_pulled_up() {
        let program = program("out += (a & b);");
        let root = program.equation_of("out").unwrap();

        let resolved = resolve(&program, "out");
        assert_eq!(resolved.id(), root.id());
        assert_eq!(resolved.assignment(), Assignment::Set);
        assert_eq!(resolved.operator(), Operator::And);
        assert!(resolved.is_simple());
    }

    #[test]
    fn resolve_when_mutual_references_then_cyclic_dependency() {
        let program = program("f = g & a; g = f | b;");

        let error = program.resolve_dependencies("f", None).unwrap_err();
        assert!(matches!(error, SemanticError::CyclicDependency(_)));
    }

    #[test]
    fn resolve_when_self_reference_then_cyclic_dependency() {
        let program = program("f = f | a;");

        let error = program.resolve_dependencies("f", None).unwrap_err();
        assert_eq!(error, SemanticError::CyclicDependency(Identifier::from("f")));
    }

    #[test]
    fn resolve_when_no_equation_then_missing_equation() {
        let program = program("out = a;");

        let error = program.resolve_dependencies("b", None).unwrap_err();
        assert_eq!(error, SemanticError::MissingEquation(Identifier::from("b")));
    }

    #[test]
    fn resolve_when_unknown_name_then_unknown_variable() {
        let program = program("out = a;");

        let error = program.resolve_dependencies("ghost", None).unwrap_err();
        assert!(matches!(error, SemanticError::UnknownVariable(_)));
    }

    #[test]
    fn resolve_when_chain_exceeds_depth_then_nesting_too_deep() {
        let length = MAX_DEPTH + 10;
        let mut text = String::from("Inputs: a=0; Flags: ");
        let names: Vec<String> = (0..length).map(|index| format!("f{}={}", index, index)).collect();
        text.push_str(&names.join(", "));
        text.push_str(";\n");

        for index in 0..length - 1 {
            text.push_str(&format!("f{} = f{};\n", index, index + 1));
        }
        text.push_str(&format!("f{} = a;\n", length - 1));

        let program = parse_str(&text).unwrap();
        let error = program.resolve_dependencies("f0", None).unwrap_err();

        assert!(matches!(error, SemanticError::NestingTooDeep(_)));
    }

    #[test]
    fn resolve_all_when_equations_share_signal_then_one_tree_per_equation() {
        let program = program("f = a & b; out = f | c; other = !f;");

        let resolved = program.resolve_all().unwrap();
        assert_eq!(resolved.len(), 3);

        // El orden es el de declaración: out, other, f
        assert!(resolved[0].terms()[0].sub_expression().is_some());
        assert!(resolved[1].terms()[0].variable().is_some());
    }
}
