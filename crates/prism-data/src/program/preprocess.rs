// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A small conditional-compilation preprocessor for shader sources.
//!
//! Only block selection is handled: `#if`, `#ifdef`, `#ifndef`, `#elif`, `#else` and
//! `#endif` lines are evaluated against a [`DefineMap`] and removed from the output,
//! together with every line of the branches not taken. Other lines, including
//! `#define`, pass through untouched.
//!
//! `#if` expressions support integer literals, define names (undefined names are `0`),
//! `defined(NAME)`, `!`, the comparison operators, `&&`, `||` and parentheses.

use prism_core::asset::DefineMap;

#[derive(Debug, Clone, Copy)]
struct Branch {
    /// The enclosing block is emitted.
    parent_active: bool,
    /// One branch of this block was already taken.
    taken: bool,
    /// The current branch is emitted.
    active: bool,
    seen_else: bool,
}

/// Resolves the conditional blocks of `source`.
///
/// ## Errors
/// A description of the first malformed directive, with its line number.
pub fn preprocess(source: &str, defines: &DefineMap) -> Result<String, String> {
    let mut out = String::with_capacity(source.len());
    let mut stack: Vec<Branch> = Vec::new();

    for (line_no, line) in source.lines().enumerate() {
        let line_no = line_no + 1;
        let active = stack.last().is_none_or(|b| b.active);
        let trimmed = line.trim_start();
        let Some(directive) = trimmed.strip_prefix('#') else {
            if active {
                out.push_str(line);
                out.push('\n');
            }
            continue;
        };
        let directive = directive.trim_start();
        let (keyword, rest) = directive
            .split_once(char::is_whitespace)
            .unwrap_or((directive, ""));
        let rest = rest.trim();

        match keyword {
            "if" | "ifdef" | "ifndef" => {
                let cond = if active {
                    match keyword {
                        "if" => evaluate(rest, defines)
                            .map_err(|e| format!("line {line_no}: {e}"))?,
                        "ifdef" => defines.contains_key(rest),
                        _ => !defines.contains_key(rest),
                    }
                } else {
                    false
                };
                stack.push(Branch {
                    parent_active: active,
                    taken: cond,
                    active: active && cond,
                    seen_else: false,
                });
            }
            "elif" => {
                let branch = stack
                    .last_mut()
                    .ok_or_else(|| format!("line {line_no}: #elif without #if"))?;
                if branch.seen_else {
                    return Err(format!("line {line_no}: #elif after #else"));
                }
                if branch.parent_active && !branch.taken {
                    let cond =
                        evaluate(rest, defines).map_err(|e| format!("line {line_no}: {e}"))?;
                    branch.active = cond;
                    branch.taken = cond;
                } else {
                    branch.active = false;
                }
            }
            "else" => {
                let branch = stack
                    .last_mut()
                    .ok_or_else(|| format!("line {line_no}: #else without #if"))?;
                if branch.seen_else {
                    return Err(format!("line {line_no}: duplicate #else"));
                }
                branch.seen_else = true;
                branch.active = branch.parent_active && !branch.taken;
                branch.taken = true;
            }
            "endif" => {
                stack
                    .pop()
                    .ok_or_else(|| format!("line {line_no}: #endif without #if"))?;
            }
            _ => {
                if active {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
    }

    if !stack.is_empty() {
        return Err(format!("{} unterminated #if block(s)", stack.len()));
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Ident(String),
    Op(&'static str),
}

const OPERATORS: [&str; 11] = ["&&", "||", "==", "!=", "<=", ">=", "<", ">", "!", "(", ")"];

fn tokenize(expr: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut rest = expr.trim_start();
    while !rest.is_empty() {
        let c = rest.chars().next().unwrap_or(' ');
        if c.is_ascii_digit() {
            let end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            let value = rest[..end]
                .parse()
                .map_err(|_| format!("bad integer '{}'", &rest[..end]))?;
            tokens.push(Token::Int(value));
            rest = &rest[end..];
        } else if c.is_ascii_alphabetic() || c == '_' {
            let end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            tokens.push(Token::Ident(rest[..end].to_string()));
            rest = &rest[end..];
        } else if let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            tokens.push(Token::Op(op));
            rest = &rest[op.len()..];
        } else {
            return Err(format!("unexpected character '{c}'"));
        }
        rest = rest.trim_start();
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    defines: &'a DefineMap,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<i64, String> {
        let mut value = self.and()?;
        while self.eat("||") {
            let rhs = self.and()?;
            value = i64::from(value != 0 || rhs != 0);
        }
        Ok(value)
    }

    fn and(&mut self) -> Result<i64, String> {
        let mut value = self.comparison()?;
        while self.eat("&&") {
            let rhs = self.comparison()?;
            value = i64::from(value != 0 && rhs != 0);
        }
        Ok(value)
    }

    fn comparison(&mut self) -> Result<i64, String> {
        let lhs = self.unary()?;
        let op = match self.peek() {
            Some(Token::Op(op)) if ["==", "!=", "<", "<=", ">", ">="].contains(op) => *op,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.unary()?;
        let result = match op {
            "==" => lhs == rhs,
            "!=" => lhs != rhs,
            "<" => lhs < rhs,
            "<=" => lhs <= rhs,
            ">" => lhs > rhs,
            _ => lhs >= rhs,
        };
        Ok(i64::from(result))
    }

    fn unary(&mut self) -> Result<i64, String> {
        if self.eat("!") {
            return Ok(i64::from(self.unary()? == 0));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<i64, String> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| "unexpected end of expression".to_string())?;
        self.pos += 1;
        match token {
            Token::Int(value) => Ok(value),
            Token::Ident(name) if name == "defined" => {
                let parens = self.eat("(");
                let name = match self.tokens.get(self.pos) {
                    Some(Token::Ident(name)) => name.clone(),
                    _ => return Err("defined() expects a name".to_string()),
                };
                self.pos += 1;
                if parens && !self.eat(")") {
                    return Err("missing ')' after defined".to_string());
                }
                Ok(i64::from(self.defines.contains_key(&name)))
            }
            Token::Ident(name) => Ok(self.defines.get(&name).map_or(0, |v| v.as_int())),
            Token::Op("(") => {
                let value = self.or()?;
                if !self.eat(")") {
                    return Err("missing ')'".to_string());
                }
                Ok(value)
            }
            Token::Op(op) => Err(format!("unexpected '{op}'")),
        }
    }
}

/// Evaluates an `#if` expression.
pub fn evaluate(expr: &str, defines: &DefineMap) -> Result<bool, String> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        defines,
    };
    let value = parser.or()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("trailing tokens in '{expr}'"));
    }
    Ok(value != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::asset::MacroValue;

    fn defines(pairs: &[(&str, MacroValue)]) -> DefineMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn selects_the_first_true_branch() {
        let src = "a\n#if MODE == 1\none\n#elif MODE == 2\ntwo\n#else\nother\n#endif\nz";
        let two = defines(&[("MODE", MacroValue::Int(2))]);
        assert_eq!(preprocess(src, &two).unwrap(), "a\ntwo\nz\n");
        assert_eq!(preprocess(src, &DefineMap::new()).unwrap(), "a\nother\nz\n");
    }

    #[test]
    fn nested_blocks_inside_a_dead_branch_stay_dead() {
        let src = "#if USE_A\n#ifdef USE_B\nab\n#else\na\n#endif\n#endif\nend";
        let only_b = defines(&[("USE_B", MacroValue::Bool(true))]);
        assert_eq!(preprocess(src, &only_b).unwrap(), "end\n");
        let both = defines(&[
            ("USE_A", MacroValue::Bool(true)),
            ("USE_B", MacroValue::Bool(true)),
        ]);
        assert_eq!(preprocess(src, &both).unwrap(), "ab\nend\n");
    }

    #[test]
    fn expressions_follow_c_precedence() {
        let d = defines(&[
            ("A", MacroValue::Int(1)),
            ("B", MacroValue::Int(0)),
            ("COUNT", MacroValue::Int(4)),
        ]);
        assert!(evaluate("A || B && 0", &d).unwrap());
        assert!(!evaluate("(A || B) && 0", &d).unwrap());
        assert!(evaluate("defined(B) && !B", &d).unwrap());
        assert!(evaluate("COUNT >= 4 && COUNT < 8", &d).unwrap());
        assert!(!evaluate("defined UNKNOWN", &d).unwrap());
    }

    #[test]
    fn malformed_directives_are_reported() {
        let d = DefineMap::new();
        assert!(preprocess("#if A\nx", &d).is_err());
        assert!(preprocess("#endif", &d).is_err());
        assert!(preprocess("#if A\n#else\n#else\n#endif", &d).is_err());
        assert!(preprocess("#if (A\n#endif", &d).is_err());
        assert!(preprocess("#if\n#endif", &d).is_err());
    }

    #[test]
    fn other_directives_pass_through() {
        let src = "#define PI 3.14\n#if 0\n#define DEAD 1\n#endif";
        assert_eq!(preprocess(src, &DefineMap::new()).unwrap(), "#define PI 3.14\n");
    }
}
