//! Render queries as readable text, for logs and for the command line.

use std::fmt;

use super::ast::*;

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, segment) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, "__")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x}"),
            Literal::String(s) => write!(f, "{s:?}"),
            Literal::Uuid(uuid) => write!(f, "\"{uuid}\""),
            Literal::Json(value) => write!(f, "{value}"),
            Literal::List(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.path, self.lookup, self.value)
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, terms: &[Predicate], separator: &str) -> fmt::Result {
    write!(f, "(")?;
    for (index, term) in terms.iter().enumerate() {
        if index > 0 {
            write!(f, " {separator} ")?;
        }
        write!(f, "{term}")?;
    }
    write!(f, ")")
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::And(terms) if terms.is_empty() => write!(f, "TRUE"),
            Predicate::Or(terms) if terms.is_empty() => write!(f, "FALSE"),
            Predicate::And(terms) if terms.len() == 1 => write!(f, "{}", terms[0]),
            Predicate::Or(terms) if terms.len() == 1 => write!(f, "{}", terms[0]),
            Predicate::And(terms) => write_joined(f, terms, "AND"),
            Predicate::Or(terms) => write_joined(f, terms, "OR"),
            Predicate::Not(inner) => write!(f, "NOT {inner}"),
            Predicate::Compare(comparison) => write!(f, "{comparison}"),
        }
    }
}

impl fmt::Display for PassOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassOrigin::Base => write!(f, "base"),
            PassOrigin::Custom(name) => write!(f, "custom:{name}"),
            PassOrigin::Permission => write!(f, "permission"),
            PassOrigin::Search => write!(f, "search"),
            PassOrigin::Client => write!(f, "client"),
        }
    }
}

impl fmt::Display for FilterPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self.kind {
            PassKind::Filter => "FILTER",
            PassKind::Exclude => "EXCLUDE",
        };
        write!(f, "{keyword} [{}] {}", self.origin, self.predicate)?;
        write_restrictions(f, &self.restrictions)
    }
}

impl fmt::Display for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RESTRICT {} TO {}", self.relation, self.predicate)
    }
}

fn write_restrictions(f: &mut fmt::Formatter<'_>, restrictions: &[Restriction]) -> fmt::Result {
    for restriction in restrictions {
        write!(f, " {restriction}")?;
    }
    Ok(())
}

impl fmt::Display for OrderByElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            OrderDirection::Asc => write!(f, "{}", self.path),
            OrderDirection::Desc => write!(f, "-{}", self.path),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FROM {}", self.entity)?;
        for pass in &self.passes {
            write!(f, "\n{pass}")?;
        }
        if !self.order_by.elements.is_empty() {
            write!(f, "\nORDER BY ")?;
            for (index, element) in self.order_by.elements.iter().enumerate() {
                if index > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{element}")?;
            }
            write_restrictions(f, &self.order_by.restrictions)?;
        }
        if let Some(limit) = self.limit.limit {
            write!(f, "\nLIMIT {limit}")?;
        }
        if let Some(offset) = self.limit.offset {
            write!(f, "\nOFFSET {offset}")?;
        }
        Ok(())
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunction::Count => write!(f, "count"),
            AggregateFunction::Sum => write!(f, "sum"),
            AggregateFunction::Avg => write!(f, "avg"),
            AggregateFunction::Min => write!(f, "min"),
            AggregateFunction::Max => write!(f, "max"),
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}({path}) AS {}", self.function, self.alias),
            None => write!(f, "{}(*) AS {}", self.function, self.alias),
        }
    }
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CREATE {}", self.entity)?;
        for (field, value) in &self.values {
            write!(f, "\nSET {field} = {value}")?;
        }
        for pass in &self.guard {
            write!(f, "\nCHECK {pass}")?;
        }
        Ok(())
    }
}
