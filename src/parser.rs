use crate::ast::*;
use crate::error::{LessError, LessResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::rc::Rc;

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(-?(?:\d*\.\d+|\d+))(%|[a-zA-Z]+)?").expect("数值正则编译失败")
});

static RAW_VARIABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@([\w-]+)").expect("变量引用正则编译失败"));

/// 这些函数的参数不参与运算，只做变量替换后原样输出。
const RAW_FUNCTIONS: &[&str] = &["url", "calc", "var", "env"];

/// LESS 解析器，负责把源码转换成 AST。
pub struct LessParser;

impl LessParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, input: &str) -> LessResult<Stylesheet> {
        let mut cursor = Cursor::new(input);
        let mut imports = Vec::new();
        let mut body = Vec::new();

        loop {
            let leading = cursor.collect_comments();
            if cursor.is_eof() {
                break;
            }
            if cursor.lookahead_is_import() {
                imports.push(self.parse_import(&mut cursor)?);
                continue;
            }
            body.push(self.parse_rule_body_item(&mut cursor, leading)?);
        }

        Ok(Stylesheet::new(imports, body))
    }

    /// 解析 `{` 之后直到匹配 `}` 的规则体。
    fn parse_block(&self, cursor: &mut Cursor<'_>) -> LessResult<Vec<RuleBody>> {
        let mut body = Vec::new();
        loop {
            let leading = cursor.collect_comments();
            match cursor.peek_char() {
                Some('}') => {
                    cursor.advance_char();
                    break;
                }
                None => {
                    return Err(LessError::parse("缺少匹配的 '}'", cursor.position()));
                }
                _ => body.push(self.parse_rule_body_item(cursor, leading)?),
            }
        }
        Ok(body)
    }

    fn parse_rule_body_item(
        &self,
        cursor: &mut Cursor<'_>,
        leading: Vec<String>,
    ) -> LessResult<RuleBody> {
        if cursor.starts_with('@') {
            if cursor.lookahead_is_variable_decl() {
                let var = self.parse_variable(cursor)?;
                return Ok(RuleBody::Variable(var));
            }
            if cursor.lookahead_is_import() {
                return Err(LessError::parse(
                    "@import 只能出现在样式表顶层",
                    cursor.position(),
                ));
            }
            if cursor.lookahead_is_detached_call() {
                let mut call = self.parse_detached_call(cursor)?;
                call.comments = Comments {
                    leading,
                    trailing: cursor.collect_trailing_comments(),
                };
                return Ok(RuleBody::DetachedCall(call));
            }
            if cursor.lookahead_is_block_at_rule() {
                let at_rule = self.parse_at_rule(cursor)?;
                return Ok(RuleBody::AtRule(at_rule));
            }
        }

        if cursor.lookahead_is_mixin_definition() {
            let mixin = self.parse_mixin_definition(cursor)?;
            return Ok(RuleBody::MixinDefinition(Rc::new(mixin)));
        }

        if cursor.lookahead_is_mixin_call() {
            let mut call = self.parse_mixin_call(cursor)?;
            call.comments = Comments {
                leading,
                trailing: cursor.collect_trailing_comments(),
            };
            return Ok(RuleBody::MixinCall(call));
        }

        match cursor.detect_body_kind() {
            Some(BodyKind::Declaration) => {
                let mut decl = self.parse_declaration(cursor)?;
                decl.comments = Comments {
                    leading,
                    trailing: cursor.collect_trailing_comments(),
                };
                Ok(RuleBody::Declaration(decl))
            }
            Some(BodyKind::NestedRule) => {
                let nested = self.parse_ruleset(cursor)?;
                Ok(RuleBody::NestedRule(nested))
            }
            None => Err(LessError::parse(
                "无法判断声明或子选择器",
                cursor.position(),
            )),
        }
    }

    fn parse_variable(&self, cursor: &mut Cursor<'_>) -> LessResult<VariableDeclaration> {
        cursor.expect_char('@')?;
        let name = cursor.read_identifier();
        cursor.skip_whitespace_and_comments();
        cursor.expect_char(':')?;
        cursor.skip_whitespace_and_comments();

        let value = if cursor.starts_with('{') {
            cursor.advance_char();
            Expression::DetachedRuleset(Rc::new(self.parse_block(cursor)?))
        } else {
            let value = self.parse_value(cursor, true, false)?;
            cursor.skip_whitespace_and_comments();
            if cursor.consume_important() {
                Expression::List {
                    separator: Separator::Space,
                    items: vec![value, Expression::keyword("!important")],
                }
            } else {
                value
            }
        };
        cursor.skip_whitespace_and_comments();
        if cursor.peek_char() == Some(';') {
            cursor.advance_char();
        }

        Ok(VariableDeclaration { name, value })
    }

    fn parse_ruleset(&self, cursor: &mut Cursor<'_>) -> LessResult<RuleSet> {
        cursor.skip_whitespace_and_comments();
        let selector_raw = cursor.read_selector();
        let selectors = split_top_level(&selector_raw, ',')
            .into_iter()
            .map(|s| Selector {
                value: s.trim().to_string(),
            })
            .filter(|sel| !sel.value.is_empty())
            .collect::<Vec<_>>();

        if selectors.is_empty() {
            return Err(LessError::parse("缺少合法的选择器", cursor.position()));
        }

        let guard = self.parse_optional_guard(cursor)?;
        cursor.expect_char('{')?;
        let body = self.parse_block(cursor)?;

        Ok(RuleSet {
            selectors,
            guard,
            body,
        })
    }

    fn parse_at_rule(&self, cursor: &mut Cursor<'_>) -> LessResult<AtRule> {
        cursor.expect_char('@')?;
        let name = cursor.read_identifier();
        if name.is_empty() {
            return Err(LessError::parse("at-rule 名称不能为空", cursor.position()));
        }
        cursor.skip_whitespace_and_comments();
        let mut params = String::new();
        let mut paren_depth = 0usize;
        while let Some(ch) = cursor.peek_char() {
            if ch == '{' && paren_depth == 0 {
                break;
            }
            match ch {
                '(' => paren_depth += 1,
                ')' => paren_depth = paren_depth.saturating_sub(1),
                _ => {}
            }
            params.push(ch);
            cursor.advance_char();
        }
        cursor.expect_char('{')?;
        let body = self.parse_block(cursor)?;
        Ok(AtRule {
            name,
            params: params.trim().to_string(),
            body,
        })
    }

    fn parse_declaration(&self, cursor: &mut Cursor<'_>) -> LessResult<Declaration> {
        let name = cursor.read_property_name();
        cursor.skip_whitespace_and_comments();
        cursor.expect_char(':')?;
        cursor.skip_whitespace_and_comments();
        let value = self.parse_value(cursor, true, false)?;
        cursor.skip_whitespace_and_comments();
        let important = cursor.consume_important();
        cursor.skip_whitespace_and_comments();

        if cursor.peek_char() == Some(';') {
            cursor.advance_char();
        }

        Ok(Declaration {
            name,
            value,
            important,
            comments: Comments::default(),
        })
    }

    fn parse_import(&self, cursor: &mut Cursor<'_>) -> LessResult<ImportStatement> {
        cursor.expect_char('@')?;
        let ident = cursor.read_identifier();
        if !ident.eq_ignore_ascii_case("import") {
            return Err(LessError::parse("仅支持 @import 语句", cursor.position()));
        }

        let target = cursor.read_until(';')?;
        cursor.expect_char(';')?;

        let mut raw = String::from("@import ");
        raw.push_str(target.trim());
        raw.push(';');
        Ok(ImportStatement { raw })
    }

    fn parse_mixin_definition(&self, cursor: &mut Cursor<'_>) -> LessResult<MixinDefinition> {
        let name = cursor.read_mixin_name()?;
        cursor.skip_whitespace_and_comments();
        let params = self.parse_mixin_params(cursor)?;
        cursor.skip_whitespace_and_comments();
        let guard = self.parse_optional_guard(cursor)?;
        cursor.expect_char('{')?;
        let body = self.parse_block(cursor)?;
        Ok(MixinDefinition {
            name,
            params,
            guard,
            body,
        })
    }

    fn parse_mixin_params(&self, cursor: &mut Cursor<'_>) -> LessResult<Vec<MixinParam>> {
        cursor.expect_char('(')?;
        let semicolons = cursor.has_top_level_semicolon();
        let mut params = Vec::new();
        loop {
            cursor.skip_whitespace_and_comments();
            match cursor.peek_char() {
                Some(')') => {
                    cursor.advance_char();
                    break;
                }
                None => {
                    return Err(LessError::parse("mixin 参数列表未闭合", cursor.position()));
                }
                _ => {}
            }
            params.push(self.parse_mixin_param(cursor, semicolons)?);
            self.expect_argument_separator(cursor, semicolons, "mixin 参数列表缺少分隔符")?;
        }
        Ok(params)
    }

    fn parse_mixin_param(&self, cursor: &mut Cursor<'_>, semicolons: bool) -> LessResult<MixinParam> {
        if cursor.consume_str("...") {
            return Ok(MixinParam::Rest { name: None });
        }
        if cursor.starts_with('@') {
            if cursor.lookahead_is_variable_decl() {
                cursor.advance_char();
                let name = cursor.read_identifier();
                cursor.skip_whitespace_and_comments();
                cursor.expect_char(':')?;
                cursor.skip_whitespace_and_comments();
                let default = self.parse_value(cursor, semicolons, false)?;
                return Ok(MixinParam::Variable {
                    name,
                    default: Some(default),
                });
            }
            cursor.advance_char();
            let name = cursor.read_identifier();
            if name.is_empty() {
                return Err(LessError::parse("mixin 参数名不能为空", cursor.position()));
            }
            if cursor.consume_str("...") {
                return Ok(MixinParam::Rest { name: Some(name) });
            }
            return Ok(MixinParam::Variable {
                name,
                default: None,
            });
        }
        Ok(MixinParam::Pattern(self.parse_value(cursor, semicolons, false)?))
    }

    fn parse_mixin_call(&self, cursor: &mut Cursor<'_>) -> LessResult<MixinCall> {
        let path = cursor.read_mixin_path()?;
        cursor.skip_whitespace_and_comments();
        let args = if cursor.peek_char() == Some('(') {
            self.parse_mixin_arguments(cursor)?
        } else {
            Vec::new()
        };
        cursor.skip_whitespace_and_comments();
        let important = cursor.consume_important();
        cursor.skip_whitespace_and_comments();
        if cursor.peek_char() == Some(';') {
            cursor.advance_char();
        }
        Ok(MixinCall {
            path,
            args,
            important,
            comments: Comments::default(),
        })
    }

    /// 实参中出现顶层 `;` 时按分号分隔，此时逗号构成列表；否则按逗号分隔。
    fn parse_mixin_arguments(&self, cursor: &mut Cursor<'_>) -> LessResult<Vec<MixinArgument>> {
        cursor.expect_char('(')?;
        let semicolons = cursor.has_top_level_semicolon();
        let mut args = Vec::new();
        loop {
            cursor.skip_whitespace_and_comments();
            match cursor.peek_char() {
                Some(')') => {
                    cursor.advance_char();
                    break;
                }
                None => {
                    return Err(LessError::parse("mixin 调用参数未闭合", cursor.position()));
                }
                _ => {}
            }
            let name = if cursor.starts_with('@') && cursor.lookahead_is_variable_decl() {
                cursor.advance_char();
                let name = cursor.read_identifier();
                cursor.skip_whitespace_and_comments();
                cursor.expect_char(':')?;
                cursor.skip_whitespace_and_comments();
                Some(name)
            } else {
                None
            };
            let value = self.parse_value(cursor, semicolons, false)?;
            args.push(MixinArgument { name, value });
            self.expect_argument_separator(cursor, semicolons, "mixin 参数调用缺少分隔符")?;
        }
        Ok(args)
    }

    fn expect_argument_separator(
        &self,
        cursor: &mut Cursor<'_>,
        semicolons: bool,
        message: &str,
    ) -> LessResult<()> {
        cursor.skip_whitespace_and_comments();
        match cursor.peek_char() {
            Some(';') if semicolons => {
                cursor.advance_char();
                Ok(())
            }
            Some(',') if !semicolons => {
                cursor.advance_char();
                Ok(())
            }
            Some(')') => Ok(()),
            _ => Err(LessError::parse(message, cursor.position())),
        }
    }

    fn parse_detached_call(&self, cursor: &mut Cursor<'_>) -> LessResult<DetachedCall> {
        cursor.expect_char('@')?;
        let name = cursor.read_identifier();
        if name.is_empty() {
            return Err(LessError::parse(
                "期待可调用的规则集名称",
                cursor.position(),
            ));
        }
        cursor.skip_whitespace_and_comments();
        cursor.expect_char('(')?;
        cursor.skip_whitespace_and_comments();
        if cursor.peek_char() != Some(')') {
            return Err(LessError::parse(
                "分离规则集调用不接受参数",
                cursor.position(),
            ));
        }
        cursor.advance_char();
        cursor.skip_whitespace_and_comments();
        if cursor.peek_char() == Some(';') {
            cursor.advance_char();
        }
        Ok(DetachedCall {
            name,
            comments: Comments::default(),
        })
    }

    fn parse_optional_guard(&self, cursor: &mut Cursor<'_>) -> LessResult<Option<Condition>> {
        cursor.skip_whitespace_and_comments();
        if !cursor.starts_with_keyword("when") {
            return Ok(None);
        }
        cursor.consume_str("when");
        let guard = self.parse_guard(cursor)?;
        cursor.skip_whitespace_and_comments();
        Ok(Some(guard))
    }

    /// `,` 与 `or` 表示或，`and` 表示与，`not` 取反。
    fn parse_guard(&self, cursor: &mut Cursor<'_>) -> LessResult<Condition> {
        let mut condition = self.parse_guard_and(cursor)?;
        loop {
            cursor.skip_whitespace_and_comments();
            if cursor.peek_char() == Some(',') {
                cursor.advance_char();
            } else if cursor.starts_with_keyword("or") {
                cursor.consume_str("or");
            } else {
                break;
            }
            let rhs = self.parse_guard_and(cursor)?;
            condition = Condition::Or(Box::new(condition), Box::new(rhs));
        }
        Ok(condition)
    }

    fn parse_guard_and(&self, cursor: &mut Cursor<'_>) -> LessResult<Condition> {
        let mut condition = self.parse_guard_not(cursor)?;
        loop {
            cursor.skip_whitespace_and_comments();
            if !cursor.starts_with_keyword("and") {
                break;
            }
            cursor.consume_str("and");
            let rhs = self.parse_guard_not(cursor)?;
            condition = Condition::And(Box::new(condition), Box::new(rhs));
        }
        Ok(condition)
    }

    fn parse_guard_not(&self, cursor: &mut Cursor<'_>) -> LessResult<Condition> {
        cursor.skip_whitespace_and_comments();
        if cursor.starts_with_keyword("not") {
            cursor.consume_str("not");
            let inner = self.parse_guard_atom(cursor)?;
            return Ok(Condition::Not(Box::new(inner)));
        }
        self.parse_guard_atom(cursor)
    }

    fn parse_guard_atom(&self, cursor: &mut Cursor<'_>) -> LessResult<Condition> {
        cursor.skip_whitespace_and_comments();
        cursor.expect_char('(')?;
        let mut attempt = cursor.clone();
        if let Ok(condition) = self.parse_comparison(&mut attempt) {
            *cursor = attempt;
            return Ok(condition);
        }
        let inner = self.parse_guard(cursor)?;
        cursor.skip_whitespace_and_comments();
        cursor.expect_char(')')?;
        Ok(inner)
    }

    fn parse_comparison(&self, cursor: &mut Cursor<'_>) -> LessResult<Condition> {
        cursor.skip_whitespace_and_comments();
        let lhs = self.parse_additive(cursor, true)?;
        cursor.skip_whitespace_and_comments();
        let condition = match cursor.read_comparison() {
            Some(op) => {
                cursor.skip_whitespace_and_comments();
                let rhs = self.parse_additive(cursor, true)?;
                cursor.skip_whitespace_and_comments();
                Condition::Compare { op, lhs, rhs }
            }
            None => Condition::Truthy(lhs),
        };
        cursor.expect_char(')')?;
        Ok(condition)
    }

    /// 逗号列表，元素为空格列表。`allow_comma` 为假时逗号留给外层作分隔符。
    fn parse_value(
        &self,
        cursor: &mut Cursor<'_>,
        allow_comma: bool,
        in_parens: bool,
    ) -> LessResult<Expression> {
        let mut items = vec![self.parse_space_list(cursor, in_parens)?];
        while allow_comma {
            cursor.skip_whitespace_and_comments();
            if cursor.peek_char() != Some(',') {
                break;
            }
            cursor.advance_char();
            items.push(self.parse_space_list(cursor, in_parens)?);
        }
        Ok(list_or_single(Separator::Comma, items))
    }

    fn parse_space_list(&self, cursor: &mut Cursor<'_>, in_parens: bool) -> LessResult<Expression> {
        let mut items = Vec::new();
        loop {
            cursor.skip_whitespace_and_comments();
            match cursor.peek_char() {
                None | Some(',' | ')' | ';' | '}' | '!') => break,
                _ => items.push(self.parse_slash_term(cursor, in_parens)?),
            }
        }
        if items.is_empty() {
            return Err(LessError::parse("缺少值", cursor.position()));
        }
        Ok(list_or_single(Separator::Space, items))
    }

    /// 括号外紧挨着的 `/` 只是分隔符，例如 `12px/1.5`。
    fn parse_slash_term(&self, cursor: &mut Cursor<'_>, in_parens: bool) -> LessResult<Expression> {
        let mut items = vec![self.parse_additive(cursor, in_parens)?];
        while cursor.peek_char() == Some('/') && !cursor.starts_with_comment() {
            cursor.advance_char();
            items.push(self.parse_additive(cursor, in_parens)?);
        }
        Ok(list_or_single(Separator::Slash, items))
    }

    fn parse_additive(&self, cursor: &mut Cursor<'_>, in_parens: bool) -> LessResult<Expression> {
        let mut lhs = self.parse_multiplicative(cursor, in_parens)?;
        loop {
            let mut lookahead = cursor.clone();
            let spaced_before = lookahead.skip_whitespace_and_comments();
            let op = match lookahead.peek_char() {
                Some('+') => Operator::Add,
                Some('-') => Operator::Subtract,
                _ => break,
            };
            let spaced_after = lookahead.peek_nth(1).map_or(true, char::is_whitespace);
            // `0 -1px` 是两个列表元素
            if spaced_before && !spaced_after && !in_parens {
                break;
            }
            lookahead.advance_char();
            lookahead.skip_whitespace_and_comments();
            *cursor = lookahead;
            let rhs = self.parse_multiplicative(cursor, in_parens)?;
            lhs = Expression::Operation {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(
        &self,
        cursor: &mut Cursor<'_>,
        in_parens: bool,
    ) -> LessResult<Expression> {
        let mut lhs = self.parse_unary(cursor)?;
        loop {
            let mut lookahead = cursor.clone();
            lookahead.skip_whitespace_and_comments();
            let op = match lookahead.peek_char() {
                Some('*') => Operator::Multiply,
                Some('/') if in_parens && !lookahead.starts_with_comment() => Operator::Divide,
                _ => break,
            };
            lookahead.advance_char();
            lookahead.skip_whitespace_and_comments();
            *cursor = lookahead;
            let rhs = self.parse_unary(cursor)?;
            lhs = Expression::Operation {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&self, cursor: &mut Cursor<'_>) -> LessResult<Expression> {
        if cursor.peek_char() == Some('-') && matches!(cursor.peek_nth(1), Some('(' | '@')) {
            cursor.advance_char();
            let inner = self.parse_primary(cursor)?;
            return Ok(Expression::Negate(Box::new(inner)));
        }
        self.parse_primary(cursor)
    }

    fn parse_primary(&self, cursor: &mut Cursor<'_>) -> LessResult<Expression> {
        let start = cursor.position();
        match cursor.peek_char() {
            Some('(') => {
                cursor.advance_char();
                cursor.skip_whitespace_and_comments();
                let inner = self.parse_additive(cursor, true)?;
                cursor.skip_whitespace_and_comments();
                cursor.expect_char(')')?;
                Ok(inner)
            }
            Some('@') => {
                cursor.advance_char();
                let name = cursor.read_identifier();
                if name.is_empty() {
                    return Err(LessError::parse("变量名不能为空", cursor.position()));
                }
                Ok(Expression::variable(name))
            }
            Some('~') if matches!(cursor.peek_nth(1), Some('"' | '\'')) => {
                cursor.advance_char();
                let (text, quote) = cursor.read_quoted()?;
                Ok(Expression::Quoted {
                    text,
                    quote,
                    escaped: true,
                })
            }
            Some('"' | '\'') => {
                let (text, quote) = cursor.read_quoted()?;
                Ok(Expression::Quoted {
                    text,
                    quote,
                    escaped: false,
                })
            }
            Some('{') => {
                cursor.advance_char();
                Ok(Expression::DetachedRuleset(Rc::new(self.parse_block(cursor)?)))
            }
            Some('#') => {
                cursor.advance_char();
                let ident = cursor.read_identifier();
                Ok(Expression::Keyword(format!("#{ident}")))
            }
            Some(_) if NUMBER_RE.is_match(cursor.rest()) => self.parse_number(cursor),
            Some(ch) if ch.is_alphabetic() || ch == '-' || ch == '_' => {
                let name = cursor.read_identifier();
                if cursor.peek_char() == Some('(') {
                    return self.parse_function(cursor, name);
                }
                Ok(Expression::Keyword(name))
            }
            _ => {
                let text = cursor.read_bare_word();
                if text.is_empty() {
                    return Err(LessError::parse("无法识别的值", start));
                }
                Ok(Expression::Keyword(text))
            }
        }
    }

    fn parse_number(&self, cursor: &mut Cursor<'_>) -> LessResult<Expression> {
        let position = cursor.position();
        let caps = NUMBER_RE
            .captures(cursor.rest())
            .ok_or_else(|| LessError::parse("期待数值", position))?;
        let length = caps.get(0).map_or(0, |m| m.len());
        let number = caps.get(1).map_or("", |m| m.as_str());
        let value: f64 = number
            .parse()
            .map_err(|_| LessError::parse(format!("无法解析数值 {number}"), position))?;
        let unit = caps.get(2).map_or("", |m| m.as_str()).to_string();
        cursor.advance_bytes(length);
        Ok(Expression::number(value, unit))
    }

    fn parse_function(&self, cursor: &mut Cursor<'_>, name: String) -> LessResult<Expression> {
        if RAW_FUNCTIONS.contains(&name.to_ascii_lowercase().as_str()) {
            let inner = cursor.read_balanced_parens()?;
            let text = RAW_VARIABLE_RE.replace_all(&inner, "@{$1}");
            return Ok(Expression::Quoted {
                text: format!("{name}({text})"),
                quote: '"',
                escaped: true,
            });
        }
        cursor.expect_char('(')?;
        let mut args = Vec::new();
        loop {
            cursor.skip_whitespace_and_comments();
            match cursor.peek_char() {
                Some(')') => {
                    cursor.advance_char();
                    break;
                }
                None => {
                    return Err(LessError::parse(
                        format!("函数 {name} 缺少 ')'"),
                        cursor.position(),
                    ));
                }
                _ => {}
            }
            args.push(self.parse_space_list(cursor, true)?);
            cursor.skip_whitespace_and_comments();
            if cursor.peek_char() == Some(',') {
                cursor.advance_char();
            }
        }
        Ok(Expression::Function { name, args })
    }
}

fn list_or_single(separator: Separator, mut items: Vec<Expression>) -> Expression {
    if items.len() == 1 {
        if let Some(item) = items.pop() {
            return item;
        }
    }
    Expression::List { separator, items }
}

/// 只在括号外按分隔符切分。
fn split_top_level(input: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in input.chars() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if ch == separator && depth == 0 {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    parts.push(current);
    parts
}

/// 带位置指针的输入游标，提供便捷的字符读取与回退功能。
struct Cursor<'a> {
    source: &'a str,
    len: usize,
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            len: source.len(),
            position: 0,
        }
    }

    fn position(&self) -> usize {
        self.position
    }

    fn rest(&self) -> &'a str {
        &self.source[self.position..]
    }

    fn is_eof(&self) -> bool {
        self.position >= self.len
    }

    fn starts_with(&self, ch: char) -> bool {
        self.peek_char() == Some(ch)
    }

    fn starts_with_comment(&self) -> bool {
        self.rest().starts_with("/*") || self.rest().starts_with("//")
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn advance_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.position += ch.len_utf8();
        Some(ch)
    }

    fn advance_bytes(&mut self, count: usize) {
        self.position = (self.position + count).min(self.len);
    }

    fn expect_char(&mut self, expect: char) -> LessResult<()> {
        match self.advance_char() {
            Some(ch) if ch == expect => Ok(()),
            Some(ch) => Err(LessError::parse(
                format!("期待字符 '{expect}', 却得到 '{ch}'"),
                self.position,
            )),
            None => Err(LessError::parse(
                format!("期待字符 '{expect}'"),
                self.position,
            )),
        }
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.position;
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.advance_char();
            } else {
                break;
            }
        }
        self.position > start
    }

    /// 返回是否跳过了任何内容。
    fn skip_whitespace_and_comments(&mut self) -> bool {
        let start = self.position;
        loop {
            self.skip_whitespace();
            if self.starts_with('/') && self.consume_comment() {
                continue;
            }
            break;
        }
        self.position > start
    }

    /// 跳过空白与注释，返回途经的块注释原文。
    fn collect_comments(&mut self) -> Vec<String> {
        let mut comments = Vec::new();
        loop {
            self.skip_whitespace();
            let start = self.position;
            let block = self.rest().starts_with("/*");
            if !self.consume_comment() {
                break;
            }
            if block {
                comments.push(self.source[start..self.position].to_string());
            }
        }
        comments
    }

    /// 与语句同一行、紧随其后的块注释。
    fn collect_trailing_comments(&mut self) -> Vec<String> {
        let mut comments = Vec::new();
        loop {
            let mut lookahead = self.clone();
            while matches!(lookahead.peek_char(), Some(' ' | '\t')) {
                lookahead.advance_char();
            }
            if !lookahead.rest().starts_with("/*") {
                break;
            }
            let start = lookahead.position;
            lookahead.consume_comment();
            comments.push(lookahead.source[start..lookahead.position].to_string());
            *self = lookahead;
        }
        comments
    }

    fn consume_comment(&mut self) -> bool {
        if self.consume_str("//") {
            while let Some(ch) = self.advance_char() {
                if ch == '\n' {
                    break;
                }
            }
            true
        } else if self.consume_str("/*") {
            while !self.is_eof() {
                if self.consume_str("*/") {
                    break;
                }
                self.advance_char();
            }
            true
        } else {
            false
        }
    }

    fn consume_str(&mut self, prefix: &str) -> bool {
        if self.rest().starts_with(prefix) {
            self.position += prefix.len();
            true
        } else {
            false
        }
    }

    fn consume_important(&mut self) -> bool {
        self.consume_str("!important")
    }

    fn starts_with_keyword(&self, keyword: &str) -> bool {
        let Some(rest) = self.rest().strip_prefix(keyword) else {
            return false;
        };
        match rest.chars().next() {
            Some(ch) => !ch.is_alphanumeric() && ch != '-' && ch != '_',
            None => true,
        }
    }

    fn read_comparison(&mut self) -> Option<Comparison> {
        for (symbol, op) in [
            (">=", Comparison::GreaterOrEqual),
            ("<=", Comparison::LessOrEqual),
            ("=<", Comparison::LessOrEqual),
            (">", Comparison::Greater),
            ("<", Comparison::Less),
            ("=", Comparison::Equal),
        ] {
            if self.consume_str(symbol) {
                return Some(op);
            }
        }
        None
    }

    fn skip_guard_condition(&mut self) {
        let mut depth = 0usize;
        while let Some(ch) = self.peek_char() {
            if ch == '{' && depth == 0 {
                break;
            }
            match ch {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.advance_char();
        }
    }

    fn skip_balanced_parens(&mut self) -> bool {
        if !self.starts_with('(') {
            return false;
        }
        self.read_balanced_parens().is_ok()
    }

    /// 读取一对括号之间的原文（不含外层括号），引号内的括号不计数。
    fn read_balanced_parens(&mut self) -> LessResult<String> {
        self.expect_char('(')?;
        let start = self.position;
        let mut depth = 1usize;
        let mut quote: Option<char> = None;
        while let Some(ch) = self.advance_char() {
            match (quote, ch) {
                (Some(open), _) if ch == open => quote = None,
                (Some(_), '\\') => {
                    self.advance_char();
                }
                (Some(_), _) => {}
                (None, '"' | '\'') => quote = Some(ch),
                (None, '(') => depth += 1,
                (None, ')') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(self.source[start..self.position - 1].to_string());
                    }
                }
                _ => {}
            }
        }
        Err(LessError::parse("括号未闭合", self.position))
    }

    /// 从 `(` 之后扫描到匹配的 `)`，判断顶层是否出现 `;`。
    fn has_top_level_semicolon(&self) -> bool {
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        let mut chars = self.rest().chars();
        while let Some(ch) = chars.next() {
            match (quote, ch) {
                (Some(open), _) if ch == open => quote = None,
                (Some(_), '\\') => {
                    chars.next();
                }
                (Some(_), _) => {}
                (None, '"' | '\'') => quote = Some(ch),
                (None, '(' | '{' | '[') => depth += 1,
                (None, ')' | '}' | ']') => {
                    if depth == 0 {
                        return false;
                    }
                    depth -= 1;
                }
                (None, ';') if depth == 0 => return true,
                _ => {}
            }
        }
        false
    }

    fn read_quoted(&mut self) -> LessResult<(String, char)> {
        let start = self.position;
        let quote = self
            .advance_char()
            .ok_or_else(|| LessError::parse("期待字符串", start))?;
        let mut text = String::new();
        while let Some(ch) = self.advance_char() {
            if ch == quote {
                return Ok((text, quote));
            }
            text.push(ch);
            if ch == '\\' {
                if let Some(escaped) = self.advance_char() {
                    text.push(escaped);
                }
            }
        }
        Err(LessError::parse("字符串未闭合", start))
    }

    fn read_identifier(&mut self) -> String {
        let mut ident = String::new();
        while let Some(ch) = self.peek_char() {
            if ch.is_alphanumeric() || ch == '-' || ch == '_' {
                ident.push(ch);
                self.advance_char();
            } else {
                break;
            }
        }
        ident
    }

    /// 无法归类的值片段，读到空白或值结束符为止。
    fn read_bare_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() || matches!(ch, ',' | ')' | ';' | '}' | '!' | '(') {
                break;
            }
            word.push(ch);
            self.advance_char();
        }
        word
    }

    fn read_property_name(&mut self) -> String {
        let mut name = String::new();
        let mut pending_interpolation = false;
        while let Some(ch) = self.peek_char() {
            if ch == ':' || ch == ';' {
                break;
            }
            if ch == '{' && !pending_interpolation {
                break;
            }
            if ch.is_control() {
                break;
            }
            self.advance_char();
            name.push(ch);
            if ch == '@' {
                pending_interpolation = true;
            } else if ch == '{' && pending_interpolation {
                while let Some(inner) = self.advance_char() {
                    name.push(inner);
                    if inner == '}' {
                        pending_interpolation = false;
                        break;
                    }
                }
            } else if !ch.is_whitespace() {
                pending_interpolation = false;
            }
        }
        name.trim().to_string()
    }

    /// 读取选择器原文，停在 `{` 或守卫关键字 `when` 之前；`@{name}` 插值整体保留。
    fn read_selector(&mut self) -> String {
        let mut selector = String::new();
        let mut last = ' ';
        while let Some(ch) = self.peek_char() {
            if ch == '{' {
                break;
            }
            if last.is_whitespace() && self.starts_with_keyword("when") {
                break;
            }
            self.advance_char();
            selector.push(ch);
            if ch == '@' && self.peek_char() == Some('{') {
                while let Some(inner) = self.advance_char() {
                    selector.push(inner);
                    if inner == '}' {
                        break;
                    }
                }
            }
            last = ch;
        }
        selector
    }

    fn read_until(&mut self, end: char) -> LessResult<String> {
        let mut result = String::new();
        while let Some(ch) = self.peek_char() {
            if ch == end {
                break;
            }
            result.push(ch);
            self.advance_char();
        }
        if self.peek_char() != Some(end) {
            return Err(LessError::parse(format!("期待字符 '{end}'"), self.position));
        }
        Ok(result)
    }

    fn read_mixin_name(&mut self) -> LessResult<String> {
        match self.peek_char() {
            Some(prefix @ ('.' | '#')) => {
                self.advance_char();
                let ident = self.read_identifier();
                if ident.is_empty() {
                    return Err(LessError::parse("mixin 名称不合法", self.position()));
                }
                Ok(format!("{prefix}{ident}"))
            }
            _ => Err(LessError::parse("期待 mixin 名称", self.position())),
        }
    }

    /// `#ns > .m`、`#ns.m` 形式的命名空间路径。
    fn read_mixin_path(&mut self) -> LessResult<Vec<String>> {
        let mut path = vec![self.read_mixin_name()?];
        loop {
            if matches!(self.peek_char(), Some('.' | '#')) {
                path.push(self.read_mixin_name()?);
                continue;
            }
            let mut lookahead = self.clone();
            lookahead.skip_whitespace();
            if lookahead.peek_char() != Some('>') {
                break;
            }
            lookahead.advance_char();
            lookahead.skip_whitespace();
            if !matches!(lookahead.peek_char(), Some('.' | '#')) {
                break;
            }
            *self = lookahead;
            path.push(self.read_mixin_name()?);
        }
        Ok(path)
    }

    fn lookahead_is_variable_decl(&self) -> bool {
        let mut lookahead = self.clone();
        if lookahead.advance_char() != Some('@') {
            return false;
        }
        if lookahead.read_identifier().is_empty() {
            return false;
        }
        lookahead.skip_whitespace();
        lookahead.peek_char() == Some(':')
    }

    fn lookahead_is_import(&self) -> bool {
        let mut lookahead = self.clone();
        if lookahead.advance_char() != Some('@') {
            return false;
        }
        lookahead.read_identifier().eq_ignore_ascii_case("import")
    }

    fn lookahead_is_block_at_rule(&self) -> bool {
        let mut lookahead = self.clone();
        if lookahead.advance_char() != Some('@') {
            return false;
        }
        if lookahead.read_identifier().is_empty() {
            return false;
        }
        lookahead.skip_whitespace_and_comments();
        let mut paren_depth = 0usize;
        while let Some(ch) = lookahead.advance_char() {
            match ch {
                '{' if paren_depth == 0 => return true,
                '(' => paren_depth += 1,
                ')' => paren_depth = paren_depth.saturating_sub(1),
                ';' => return false,
                _ => {}
            }
        }
        false
    }

    fn lookahead_is_mixin_definition(&self) -> bool {
        let mut lookahead = self.clone();
        if lookahead.read_mixin_name().is_err() {
            return false;
        }
        lookahead.skip_whitespace_and_comments();
        if !lookahead.skip_balanced_parens() {
            return false;
        }
        lookahead.skip_whitespace_and_comments();
        if lookahead.starts_with_keyword("when") {
            lookahead.consume_str("when");
            lookahead.skip_guard_condition();
        }
        lookahead.peek_char() == Some('{')
    }

    fn lookahead_is_mixin_call(&self) -> bool {
        let mut lookahead = self.clone();
        if lookahead.read_mixin_path().is_err() {
            return false;
        }
        lookahead.skip_whitespace_and_comments();
        if lookahead.starts_with('(') && !lookahead.skip_balanced_parens() {
            return false;
        }
        lookahead.skip_whitespace_and_comments();
        lookahead.consume_important();
        lookahead.skip_whitespace_and_comments();
        matches!(lookahead.peek_char(), Some(';' | '}'))
    }

    fn lookahead_is_detached_call(&self) -> bool {
        let mut lookahead = self.clone();
        if lookahead.advance_char() != Some('@') {
            return false;
        }
        if lookahead.read_identifier().is_empty() {
            return false;
        }
        lookahead.skip_whitespace_and_comments();
        if !lookahead.skip_balanced_parens() {
            return false;
        }
        lookahead.skip_whitespace_and_comments();
        matches!(lookahead.peek_char(), Some(';' | '}'))
    }

    /// 通过向前查看判断接下来的语句类型（声明或子规则）。
    fn detect_body_kind(&self) -> Option<BodyKind> {
        let mut iter = self.clone();
        iter.skip_whitespace_and_comments();
        let mut saw_colon = false;
        let mut pending_interpolation = false;
        while let Some(ch) = iter.peek_char() {
            match ch {
                '@' => {
                    pending_interpolation = true;
                    iter.advance_char();
                    continue;
                }
                '{' if pending_interpolation => {
                    iter.advance_char();
                    while let Some(inner) = iter.advance_char() {
                        if inner == '}' {
                            break;
                        }
                    }
                    pending_interpolation = false;
                    continue;
                }
                '{' => return Some(BodyKind::NestedRule),
                ';' => return Some(BodyKind::Declaration),
                '}' => {
                    return if saw_colon {
                        Some(BodyKind::Declaration)
                    } else {
                        None
                    }
                }
                ':' => {
                    saw_colon = true;
                }
                _ => {
                    pending_interpolation = false;
                }
            }
            iter.advance_char();
        }
        if saw_colon {
            Some(BodyKind::Declaration)
        } else {
            None
        }
    }
}

impl<'a> Clone for Cursor<'a> {
    fn clone(&self) -> Self {
        Self {
            source: self.source,
            len: self.len,
            position: self.position,
        }
    }
}

enum BodyKind {
    Declaration,
    NestedRule,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Stylesheet {
        LessParser::new().parse(src).unwrap()
    }

    fn first_rule_body(src: &str) -> Vec<RuleBody> {
        match parse(src).body.into_iter().next() {
            Some(RuleBody::NestedRule(rule)) => rule.body,
            other => panic!("expected a ruleset, got {other:?}"),
        }
    }

    fn declaration_value(src: &str) -> Expression {
        match first_rule_body(src).into_iter().next() {
            Some(RuleBody::Declaration(decl)) => decl.value,
            other => panic!("expected a declaration, got {other:?}"),
        }
    }

    #[test]
    fn imports_are_collected_separately() {
        let stylesheet = parse("@import (css) \"reset.css\";\n.a { color: red; }");
        assert_eq!(stylesheet.imports[0].raw, "@import (css) \"reset.css\";");
        assert_eq!(stylesheet.body.len(), 1);
    }

    #[test]
    fn definition_with_guard_and_defaults() {
        let stylesheet = parse(".m(@x: 1; @rest...) when (@x > 0) and not (default()) { w: @x; }");
        let Some(RuleBody::MixinDefinition(def)) = stylesheet.body.first() else {
            panic!("expected a mixin definition");
        };
        assert_eq!(def.name, ".m");
        assert_eq!(
            def.params,
            vec![
                MixinParam::Variable {
                    name: "x".into(),
                    default: Some(Expression::number(1.0, "")),
                },
                MixinParam::Rest {
                    name: Some("rest".into()),
                },
            ]
        );
        assert!(matches!(def.guard, Some(Condition::And(_, _))));
    }

    #[test]
    fn semicolon_arguments_keep_comma_lists() {
        let body = first_rule_body(".a { .m(1px, 2px; @color: red) !important; }");
        let Some(RuleBody::MixinCall(call)) = body.first() else {
            panic!("expected a mixin call");
        };
        assert!(call.important);
        assert_eq!(call.args.len(), 2);
        assert!(matches!(
            call.args[0].value,
            Expression::List {
                separator: Separator::Comma,
                ..
            }
        ));
        assert_eq!(call.args[1].name.as_deref(), Some("color"));
    }

    #[test]
    fn namespace_paths() {
        for src in [".a { #ns > .m(); }", ".a { #ns.m(); }", ".a { #ns > .m; }"] {
            let body = first_rule_body(src);
            let Some(RuleBody::MixinCall(call)) = body.first() else {
                panic!("expected a mixin call in {src}");
            };
            assert_eq!(call.path, vec!["#ns".to_string(), ".m".to_string()]);
        }
    }

    #[test]
    fn subtraction_needs_spacing_to_be_an_operator() {
        assert!(matches!(
            declaration_value(".a { w: @i - 1; }"),
            Expression::Operation {
                op: Operator::Subtract,
                ..
            }
        ));
        assert!(matches!(
            declaration_value(".a { margin: 0 -1px; }"),
            Expression::List {
                separator: Separator::Space,
                ..
            }
        ));
        assert_eq!(
            declaration_value(".a { display: inline-flex; }"),
            Expression::keyword("inline-flex")
        );
    }

    #[test]
    fn slash_outside_parentheses_is_a_separator() {
        assert!(matches!(
            declaration_value(".a { font: 12px/1.5 sans-serif; }"),
            Expression::List {
                separator: Separator::Space,
                ..
            }
        ));
        assert!(matches!(
            declaration_value(".a { w: (@gap / 2); }"),
            Expression::Operation {
                op: Operator::Divide,
                ..
            }
        ));
    }

    #[test]
    fn detached_rulesets_and_calls() {
        let stylesheet = parse("@dr: { color: red; };\n.a { @dr(); }");
        assert!(matches!(
            &stylesheet.body[0],
            RuleBody::Variable(VariableDeclaration {
                value: Expression::DetachedRuleset(_),
                ..
            })
        ));
        let RuleBody::NestedRule(rule) = &stylesheet.body[1] else {
            panic!("expected a ruleset");
        };
        assert!(matches!(rule.body[0], RuleBody::DetachedCall(_)));
    }

    #[test]
    fn ruleset_guard_is_split_from_selector() {
        let stylesheet = parse(".a when (@mode = dark) { color: black; }");
        let RuleBody::NestedRule(rule) = &stylesheet.body[0] else {
            panic!("expected a ruleset");
        };
        assert_eq!(rule.selectors[0].value, ".a");
        assert!(matches!(
            rule.guard,
            Some(Condition::Compare {
                op: Comparison::Equal,
                ..
            })
        ));
    }

    #[test]
    fn url_keeps_raw_text_with_variables() {
        assert_eq!(
            declaration_value(".a { background: url(@base/img.png); }"),
            Expression::Quoted {
                text: "url(@{base}/img.png)".into(),
                quote: '"',
                escaped: true,
            }
        );
    }

    #[test]
    fn comments_attach_to_declarations() {
        let body = first_rule_body(".a {\n  /* lead */\n  color: red; /* tail */\n}");
        let Some(RuleBody::Declaration(decl)) = body.first() else {
            panic!("expected a declaration");
        };
        assert_eq!(decl.comments.leading, vec!["/* lead */".to_string()]);
        assert_eq!(decl.comments.trailing, vec!["/* tail */".to_string()]);
    }

    #[test]
    fn pattern_parameters() {
        let stylesheet = parse(".m(dark; @color) { c: @color; }");
        let Some(RuleBody::MixinDefinition(def)) = stylesheet.body.first() else {
            panic!("expected a mixin definition");
        };
        assert_eq!(
            def.params[0],
            MixinParam::Pattern(Expression::keyword("dark"))
        );
    }
}
