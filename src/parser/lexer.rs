// Copyright 2026 Vexpr Contributors
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

//! Expression lexer (tokenizer)

use super::token::{is_operator_char, is_punctuator, Token, TokenType};

/// Lexer for expression text
pub struct Lexer {
    /// Input characters
    input: Vec<char>,
    /// Current position in input (points to current char)
    position: usize,
    /// Current reading position in input (after current char)
    read_position: usize,
    /// Current character under examination
    ch: char,
}

impl Lexer {
    /// Create a new lexer for the given input
    pub fn new(input: &str) -> Self {
        let mut lexer = Self {
            input: input.chars().collect(),
            position: 0,
            read_position: 0,
            ch: '\0',
        };
        lexer.read_char();
        lexer
    }

    /// Read the next character
    fn read_char(&mut self) {
        if self.read_position >= self.input.len() {
            self.position = self.input.len();
            self.ch = '\0';
        } else {
            self.ch = self.input[self.read_position];
            self.position = self.read_position;
            self.read_position += 1;
        }
    }

    /// Peek at the next character without advancing
    fn peek_char(&self) -> char {
        if self.read_position >= self.input.len() {
            '\0'
        } else {
            self.input[self.read_position]
        }
    }

    fn skip_whitespace(&mut self) {
        while self.ch.is_whitespace() {
            self.read_char();
        }
    }

    /// Lex the entire input into tokens, ending with Eof
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.token_type == TokenType::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let offset = self.position;

        match self.ch {
            '\0' => Token::eof(offset),

            // Byte-string literal, single or double quoted
            '\'' | '"' => {
                let quote = self.ch;
                match self.read_string_literal(quote) {
                    Some(literal) => Token::new(TokenType::String, literal, offset),
                    None => Token::new(TokenType::Illegal, "unterminated string", offset),
                }
            }

            // Number literal; a trailing 'j' marks an imaginary literal
            c if c.is_ascii_digit() || (c == '.' && self.peek_char().is_ascii_digit()) => {
                let (literal, is_float, is_imaginary) = self.read_number();
                let token_type = if is_imaginary {
                    TokenType::Imaginary
                } else if is_float {
                    TokenType::Float
                } else {
                    TokenType::Integer
                };
                Token::new(token_type, literal, offset)
            }

            // Identifier or function name
            c if c.is_alphabetic() || c == '_' => {
                let literal = self.read_identifier();
                Token::new(TokenType::Identifier, literal, offset)
            }

            c if is_punctuator(c) => {
                self.read_char();
                Token::new(TokenType::Punctuator, c.to_string(), offset)
            }

            c if is_operator_char(c) => {
                let literal = self.read_operator();
                Token::new(TokenType::Operator, literal, offset)
            }

            c => {
                self.read_char();
                Token::new(TokenType::Illegal, c.to_string(), offset)
            }
        }
    }

    /// Read a (possibly floating, possibly imaginary) number literal
    fn read_number(&mut self) -> (String, bool, bool) {
        let mut literal = String::new();
        let mut is_float = false;

        while self.ch.is_ascii_digit() {
            literal.push(self.ch);
            self.read_char();
        }
        if self.ch == '.' {
            is_float = true;
            literal.push(self.ch);
            self.read_char();
            while self.ch.is_ascii_digit() {
                literal.push(self.ch);
                self.read_char();
            }
        }
        if self.ch == 'e' || self.ch == 'E' {
            let next = self.peek_char();
            if next.is_ascii_digit() || next == '+' || next == '-' {
                is_float = true;
                literal.push(self.ch);
                self.read_char();
                if self.ch == '+' || self.ch == '-' {
                    literal.push(self.ch);
                    self.read_char();
                }
                while self.ch.is_ascii_digit() {
                    literal.push(self.ch);
                    self.read_char();
                }
            }
        }
        if self.ch == 'j' || self.ch == 'J' {
            self.read_char();
            return (literal, true, true);
        }
        (literal, is_float, false)
    }

    /// Read an identifier
    fn read_identifier(&mut self) -> String {
        let mut literal = String::new();
        while self.ch.is_alphanumeric() || self.ch == '_' {
            literal.push(self.ch);
            self.read_char();
        }
        literal
    }

    /// Read a quoted string; returns None when the closing quote is missing
    fn read_string_literal(&mut self, quote: char) -> Option<String> {
        let mut literal = String::new();
        self.read_char(); // skip opening quote
        while self.ch != quote {
            if self.ch == '\0' {
                return None;
            }
            literal.push(self.ch);
            self.read_char();
        }
        self.read_char(); // skip closing quote
        Some(literal)
    }

    /// Read a one- or two-character operator
    fn read_operator(&mut self) -> String {
        let first = self.ch;
        self.read_char();
        let two = match (first, self.ch) {
            ('*', '*') | ('<', '<') | ('>', '>') | ('<', '=') | ('>', '=') | ('=', '=')
            | ('!', '=') => true,
            _ => false,
        };
        if two {
            let second = self.ch;
            self.read_char();
            let mut s = String::with_capacity(2);
            s.push(first);
            s.push(second);
            s
        } else {
            first.to_string()
        }
    }
}
