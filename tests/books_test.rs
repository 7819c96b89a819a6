use std::fs;

use xml_push::sax::{coalesce_text, Collector, Event};
use xml_push::{Parser, Status};

fn read_books() -> Vec<u8> {
    match fs::read("tests/xml_files/books.xml") {
        Ok(bytes) => bytes,
        Err(e) => {
            println!("{}", e);
            panic!("file error");
        }
    }
}

fn debug_lines(events: Vec<Event>) -> String {
    let mut result = String::new();
    for event in coalesce_text(events) {
        result.push_str(&format!("{:?}\n", event));
    }
    result
}

#[test]
fn books_in_chunks() {
    let expected = r#"XmlDecl { version: "1.0", encoding: Some("UTF-8"), standalone: None }
StartElement { name: "fp:books", attributes: [Attribute { name: "xmlns:fp", value: "http://github.com/fatihpense" }] }
Text("\n    ")
StartElement { name: "fp:book", attributes: [Attribute { name: "fp:archive", value: "true" }, Attribute { name: "fp:read", value: "true" }, Attribute { name: "fp:gifted", value: "false" }] }
Text("\n        ")
StartElement { name: "fp:title_english", attributes: [] }
Text("Madonna in a Fur Coat")
EndElement { name: "fp:title_english" }
Text("\n        ")
StartElement { name: "fp:title_original", attributes: [] }
Text("Kürk Mantolu Madonna")
EndElement { name: "fp:title_original" }
Text("\n        ")
StartElement { name: "fp:author", attributes: [] }
Text("Sabahattin Ali")
EndElement { name: "fp:author" }
Text("\n        ")
StartElement { name: "fp:quote_english", attributes: [] }
Text("It is, perhaps, easier to dismiss a man whose face gives no indication of an inner life. And what a pity that is: a dash of curiosity is all it takes to stumble upon treasures we never expected.")
EndElement { name: "fp:quote_english" }
Text("\n        ")
StartElement { name: "fp:original_language", attributes: [] }
Text("tr")
EndElement { name: "fp:original_language" }
Text("\n    ")
EndElement { name: "fp:book" }
Text("\n")
EndElement { name: "fp:books" }
"#;

    let bytes = read_books();
    for size in [1, 2, 3, 7, 64, 1024, bytes.len()] {
        let mut p = Parser::new(Collector::new());
        for chunk in bytes.chunks(size) {
            assert_eq!(p.feed(chunk, false), Ok(Status::Ok));
        }
        assert_eq!(p.feed(b"", true), Ok(Status::Ok));
        assert_eq!(p.error(), None);

        let result = debug_lines(p.into_handler().take_events());
        pretty_assertions::assert_eq!(result, expected, "chunk size {}", size);
    }
}

#[test]
fn books_position_after_final_chunk() {
    let bytes = read_books();
    let mut p = Parser::new(Collector::new());
    assert!(p.parse(&bytes, true));
    // ten CRLF terminated lines
    assert_eq!(p.line_number(), 11);
    assert_eq!(p.column_number(), 0);
    assert_eq!(p.byte_index(), bytes.len() as i64);
}

#[test]
fn comments_and_cdata() {
    let doc = "<doc><!-- This is a comment --><a>abc</a><![CDATA[abc]]>\
               <!--comments can be--><![CDATA[<&>]]><!--here--><![CDATA[ ]] & < >  ]]></doc>";
    let mut p = Parser::new(Collector::new());
    assert!(p.parse(doc.as_bytes(), true));

    let mut comments = String::new();
    let mut cdatas = String::new();
    let mut inside_cdata = false;
    for event in p.handler().coalesced() {
        match event {
            Event::Comment(c) => {
                comments.push_str(&c);
                comments.push(',');
            }
            Event::StartCdata => inside_cdata = true,
            Event::EndCdata => {
                inside_cdata = false;
                cdatas.push(',');
            }
            Event::Text(t) if inside_cdata => cdatas.push_str(&t),
            _ => {}
        }
    }

    assert_eq!(comments, " This is a comment ,comments can be,here,");
    assert_eq!(cdatas, "abc,<&>, ]] & < >  ,");
}
