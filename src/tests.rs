#![cfg(test)]

use crate::{
    defenum, defobject, Dyn, Engine, Error, ErrorKind, Obj, Reader, Registry, Syntax, Token,
    Writer,
};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, LinkedList, VecDeque};
use std::rc::Rc;

// - - - test domain, mirroring a small contact book - - -

#[derive(Debug, Default, PartialEq)]
struct Phone {
    kind: String,
    number: String,
}

#[derive(Debug, Default, PartialEq)]
struct Address {
    street: String,
    city: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
enum Gender {
    #[default]
    Unknown,
    Male,
    Female,
}

#[derive(Debug, Default)]
struct Contact {
    first: String,
    last: String,
    gender: Gender,
    age: u16,
    address: Address,
    second_address: Option<Box<Address>>,
    phones: Vec<Obj<Phone>>,
    partner: Option<Dyn<Contact>>,
    children: Vec<Dyn<Contact>>,
}

#[derive(Debug, Default)]
struct Photo {
    image: String,
    width: u32,
    height: u32,
}

#[derive(Debug, Default)]
struct PhotoContact {
    contact: Contact,
    photo: Photo,
}

defobject!(Phone, Address, Contact, Photo, PhotoContact);
defenum!(Gender { Unknown, Male, Female });

fn phone_registry() -> Registry {
    let mut reg = Registry::new();
    reg.defclass::<Phone>("Phone")
        .member("type", |p: &Phone| &p.kind, |p: &mut Phone| &mut p.kind)
        .member(
            "number",
            |p: &Phone| &p.number,
            |p: &mut Phone| &mut p.number,
        );
    reg
}

fn contact_registry() -> Registry {
    let mut reg = phone_registry();
    reg.defclass::<Address>("Address")
        .member(
            "street",
            |a: &Address| &a.street,
            |a: &mut Address| &mut a.street,
        )
        .member("city", |a: &Address| &a.city, |a: &mut Address| &mut a.city);
    reg.defclass::<Contact>("Contact")
        .member("first", |c: &Contact| &c.first, |c: &mut Contact| &mut c.first)
        .member("last", |c: &Contact| &c.last, |c: &mut Contact| &mut c.last)
        .member(
            "gender",
            |c: &Contact| &c.gender,
            |c: &mut Contact| &mut c.gender,
        )
        .member("age", |c: &Contact| &c.age, |c: &mut Contact| &mut c.age)
        .member(
            "address",
            |c: &Contact| &c.address,
            |c: &mut Contact| &mut c.address,
        )
        .member(
            "second_address",
            |c: &Contact| &c.second_address,
            |c: &mut Contact| &mut c.second_address,
        )
        .member(
            "phones",
            |c: &Contact| &c.phones,
            |c: &mut Contact| &mut c.phones,
        )
        .member(
            "partner",
            |c: &Contact| &c.partner,
            |c: &mut Contact| &mut c.partner,
        )
        .member(
            "children",
            |c: &Contact| &c.children,
            |c: &mut Contact| &mut c.children,
        );
    reg.defclass_with::<Photo>("Photo", None)
        .member("image", |p: &Photo| &p.image, |p: &mut Photo| &mut p.image)
        .member("width", |p: &Photo| &p.width, |p: &mut Photo| &mut p.width)
        .member(
            "height",
            |p: &Photo| &p.height,
            |p: &mut Photo| &mut p.height,
        );
    reg.defclass::<PhotoContact>("PhotoContact")
        .extends::<Contact>(
            |p: &PhotoContact| &p.contact,
            |p: &mut PhotoContact| &mut p.contact,
        )
        .extends::<Photo>(
            |p: &PhotoContact| &p.photo,
            |p: &mut PhotoContact| &mut p.photo,
        );
    reg
}

fn shared_phone(kind: &str, number: &str) -> Obj<Phone> {
    Obj::new(Phone {
        kind: kind.to_owned(),
        number: number.to_owned(),
    })
}

// two parents sharing one child and one home phone; the partner links form
// a cycle
fn build_family() -> Obj<PhotoContact> {
    let home = shared_phone("home", "212 555-1234");
    let laura = Obj::new(Contact {
        first: "Laura".into(),
        last: "Smith".into(),
        gender: Gender::Female,
        age: 6,
        phones: vec![home.clone()],
        ..Contact::default()
    });
    let john = Obj::new(PhotoContact {
        contact: Contact {
            first: "John".into(),
            last: "Smith".into(),
            gender: Gender::Male,
            age: 38,
            address: Address {
                street: "21 2nd Street".into(),
                city: "New York".into(),
            },
            phones: vec![home.clone(), shared_phone("mobile", "123 456-7890")],
            children: vec![Dyn::new(laura.clone())],
            ..Contact::default()
        },
        photo: Photo {
            image: "john.png".into(),
            width: 75,
            height: 50,
        },
    });
    let bessie = Obj::new(PhotoContact {
        contact: Contact {
            first: "Bessie".into(),
            last: "Smith".into(),
            gender: Gender::Female,
            age: 40,
            phones: vec![home],
            partner: Some(Dyn::new(john.clone())),
            children: vec![Dyn::new(laura.clone())],
            ..Contact::default()
        },
        photo: Photo {
            image: "bessie.png".into(),
            width: 50,
            height: 50,
        },
    });
    john.borrow_mut().contact.partner = Some(Dyn::new(bessie.clone()));
    bessie
}

// - - - literal scenarios - - -

#[test]
fn writes_a_single_object() {
    let reg = phone_registry();
    let mut engine = Engine::new(&reg);
    let phone = Phone {
        kind: "home".into(),
        number: "212".into(),
    };
    let out = engine.write_string(&phone).unwrap();
    assert_eq!(out, "{\n  \"type\": \"home\",\n  \"number\": \"212\"\n}\n");
}

#[derive(Debug, Default)]
struct Node {
    v: i32,
    next: Option<Obj<Node>>,
}

defobject!(Node);

fn node_registry() -> Registry {
    let mut reg = Registry::new();
    reg.defclass::<Node>("Node")
        .member("v", |n: &Node| &n.v, |n: &mut Node| &mut n.v)
        .member("next", |n: &Node| &n.next, |n: &mut Node| &mut n.next);
    reg
}

#[test]
fn shared_objects_write_ids_and_back_references() {
    let reg = node_registry();
    let mut engine = Engine::new(&reg);
    engine.set_sharing(true);
    let b = Obj::new(Node { v: 2, next: None });
    let a = Obj::new(Node {
        v: 1,
        next: Some(b),
    });
    let roots = vec![a.clone(), a];
    let out = engine.write_string(&roots).unwrap();
    assert_eq!(
        out,
        concat!(
            "[\n",
            "  {\n",
            "    \"@id\": \"1\",\n",
            "    \"v\": 1,\n",
            "    \"next\": {\n",
            "      \"@id\": \"2\",\n",
            "      \"v\": 2,\n",
            "      \"next\": null\n",
            "    }\n",
            "  },\n",
            "  \"@1\"\n",
            "]\n"
        )
    );
}

#[test]
fn cycles_round_trip_with_sharing() {
    let reg = node_registry();
    let mut engine = Engine::new(&reg);
    engine.set_sharing(true);
    let a = Obj::new(Node { v: 1, next: None });
    let b = Obj::new(Node {
        v: 2,
        next: Some(a.clone()),
    });
    a.borrow_mut().next = Some(b);
    let out = engine.write_string(&a).unwrap();

    let mut copy = Obj::new(Node::default());
    engine.read_str(&mut copy, &out).unwrap();
    let second = copy.borrow().next.clone().unwrap();
    let third = second.borrow().next.clone().unwrap();
    assert_eq!(copy.borrow().v, 1);
    assert_eq!(second.borrow().v, 2);
    assert!(third.ptr_eq(&copy));
}

#[derive(Debug, Default)]
struct ShapeData {
    x: i32,
}

#[derive(Debug, Default)]
struct CircleData {
    shape: ShapeData,
    y: i32,
}

defobject!(ShapeData, CircleData);

fn shape_registry() -> Registry {
    let mut reg = Registry::new();
    reg.defclass_with::<ShapeData>("Shape", None).member(
        "x",
        |s: &ShapeData| &s.x,
        |s: &mut ShapeData| &mut s.x,
    );
    reg.defclass::<CircleData>("Circle")
        .extends::<ShapeData>(
            |c: &CircleData| &c.shape,
            |c: &mut CircleData| &mut c.shape,
        )
        .member("y", |c: &CircleData| &c.y, |c: &mut CircleData| &mut c.y);
    reg
}

#[test]
fn derived_instance_in_base_field_gets_a_class_tag() {
    let reg = shape_registry();
    let mut engine = Engine::new(&reg);
    let value: Dyn<ShapeData> = Dyn::new(Obj::new(CircleData {
        shape: ShapeData { x: 7 },
        y: 9,
    }));
    let out = engine.write_string(&value).unwrap();
    assert_eq!(
        out,
        "{\n  \"@class\": \"Circle\",\n  \"x\": 7,\n  \"y\": 9\n}\n"
    );

    let mut copy: Option<Dyn<ShapeData>> = None;
    engine.read_str(&mut copy, &out).unwrap();
    let copy = copy.unwrap();
    let circle = copy.downcast::<CircleData>().unwrap();
    assert_eq!(circle.borrow().shape.x, 7);
    assert_eq!(circle.borrow().y, 9);
}

#[test]
fn abstract_class_cannot_be_materialized() {
    let reg = shape_registry();
    let mut engine = Engine::new(&reg);
    let mut copy: Option<Dyn<ShapeData>> = None;
    let err = engine.read_str(&mut copy, "{\"x\": 1}").unwrap_err();
    assert_eq!(err.kind, ErrorKind::AbstractClass);
}

fn collecting_engine(reg: &Registry) -> (Engine<'_>, Rc<RefCell<Vec<Error>>>) {
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = errors.clone();
    let engine = Engine::with_handler(reg, Box::new(move |e| sink.borrow_mut().push(e.clone())));
    (engine, errors)
}

#[test]
fn unknown_member_is_reported_and_skipped() {
    let reg = phone_registry();
    let (mut engine, errors) = collecting_engine(&reg);
    let mut phone = Phone::default();
    let doc = "{\"type\":\"home\",\"extra\":\"x\",\"number\":\"1\"}";
    let result = engine.read_str(&mut phone, doc);
    assert!(result.is_err());
    assert_eq!(phone.kind, "home");
    assert_eq!(phone.number, "1");
    let errors = errors.borrow();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::UnknownMember);
    assert!(errors[0].detail.contains("'extra' in class 'Phone'"));
}

#[test]
fn relaxed_dialect_parses_bare_tokens_and_comments() {
    let reg = phone_registry();
    let mut engine = Engine::new(&reg);
    engine.set_syntax(Syntax::RELAXED);
    let mut phone = Phone::default();
    let doc = "{\n  type: home  // phone\n  number: \"1-2\"\n}";
    engine.read_str(&mut phone, doc).unwrap();
    assert_eq!(phone.kind, "home");
    assert_eq!(phone.number, "1-2");
}

// - - - dialects - - -

#[test]
fn comments_behave_as_whitespace_by_default() {
    let reg = phone_registry();
    let mut engine = Engine::new(&reg);
    let mut phone = Phone::default();
    let doc = "{\"type\": /* kind */ \"home\", // trailing\n \"number\": \"1\"}";
    engine.read_str(&mut phone, doc).unwrap();
    assert_eq!(phone.kind, "home");
    assert_eq!(phone.number, "1");
}

#[test]
fn strict_mode_rejects_bare_names() {
    let reg = phone_registry();
    let mut engine = Engine::new(&reg);
    engine.set_syntax(Syntax::STRICT);
    let mut phone = Phone::default();
    let err = engine.read_str(&mut phone, "{type: \"home\"}").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ExpectingString);
}

#[test]
fn strict_mode_rejects_unquoted_text_values() {
    let reg = phone_registry();
    let mut engine = Engine::new(&reg);
    engine.set_syntax(Syntax::STRICT);
    let mut phone = Phone::default();
    let err = engine
        .read_str(&mut phone, "{\"type\": home}")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidValue);
}

#[test]
fn newline_separates_pairs_under_no_commas() {
    let reg = phone_registry();
    let mut engine = Engine::new(&reg);
    engine.set_syntax(Syntax::COMMENTS | Syntax::NO_COMMAS);
    let mut phone = Phone::default();
    let doc = "{\n  \"type\": \"home\"\n  \"number\": \"33\"\n}";
    engine.read_str(&mut phone, doc).unwrap();
    assert_eq!(phone.kind, "home");
    assert_eq!(phone.number, "33");
}

#[test]
fn raw_newlines_in_strings_require_the_newlines_bit() {
    let reg = phone_registry();
    let doc = "{\"type\": \"ho\nme\", \"number\": \"1\"}";

    let mut engine = Engine::new(&reg);
    let mut phone = Phone::default();
    let err = engine.read_str(&mut phone, doc).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidCharacter);

    engine.set_syntax(Syntax::COMMENTS | Syntax::NEWLINES);
    let mut phone = Phone::default();
    engine.read_str(&mut phone, doc).unwrap();
    assert_eq!(phone.kind, "ho\nme");
}

#[test]
fn triple_quoted_strings_preserve_whitespace_and_quotes() {
    let reg = phone_registry();
    let mut engine = Engine::new(&reg);
    engine.set_syntax(Syntax::RELAXED);
    let mut phone = Phone::default();
    let doc = "{\"type\": \"\"\"a \"b\"\n  c\"\"\", \"number\": \"1\"}";
    engine.read_str(&mut phone, doc).unwrap();
    assert_eq!(phone.kind, "a \"b\"\n  c");
    assert_eq!(phone.number, "1");
}

#[test]
fn bare_values_are_right_trimmed() {
    let reg = phone_registry();
    let mut engine = Engine::new(&reg);
    engine.set_syntax(Syntax::RELAXED);
    let mut phone = Phone::default();
    engine
        .read_str(&mut phone, "{type: home   , number: \"1\"}")
        .unwrap();
    assert_eq!(phone.kind, "home");
}

// - - - containers and maps - - -

#[derive(Debug, Default, PartialEq)]
struct Bag {
    names: Vec<String>,
    numbers: VecDeque<i32>,
    labels: LinkedList<String>,
    sorted: BTreeSet<String>,
    mixed: HashSet<i32>,
    fixed: [String; 3],
    ranks: BTreeMap<String, i32>,
    loose: HashMap<String, i32>,
    note: Option<Box<String>>,
    flag: Option<bool>,
}

defobject!(Bag);

fn bag_registry() -> Registry {
    let mut reg = Registry::new();
    reg.defclass::<Bag>("Bag")
        .member("names", |b: &Bag| &b.names, |b: &mut Bag| &mut b.names)
        .member(
            "numbers",
            |b: &Bag| &b.numbers,
            |b: &mut Bag| &mut b.numbers,
        )
        .member("labels", |b: &Bag| &b.labels, |b: &mut Bag| &mut b.labels)
        .member("sorted", |b: &Bag| &b.sorted, |b: &mut Bag| &mut b.sorted)
        .member("mixed", |b: &Bag| &b.mixed, |b: &mut Bag| &mut b.mixed)
        .member("fixed", |b: &Bag| &b.fixed, |b: &mut Bag| &mut b.fixed)
        .member("ranks", |b: &Bag| &b.ranks, |b: &mut Bag| &mut b.ranks)
        .member("loose", |b: &Bag| &b.loose, |b: &mut Bag| &mut b.loose)
        .member("note", |b: &Bag| &b.note, |b: &mut Bag| &mut b.note)
        .member("flag", |b: &Bag| &b.flag, |b: &mut Bag| &mut b.flag);
    reg
}

#[test]
fn containers_round_trip() {
    let reg = bag_registry();
    let mut engine = Engine::new(&reg);
    let bag = Bag {
        names: vec!["aaa".into(), "bbb".into()],
        numbers: VecDeque::from([3, 1, 2]),
        labels: LinkedList::from(["x".into(), "y".into()]),
        sorted: BTreeSet::from(["ccc".into(), "aaa".into()]),
        mixed: HashSet::from([5, 9]),
        fixed: ["one".into(), "two".into(), "three".into()],
        ranks: BTreeMap::from([("xxx".into(), 1), ("yyy".into(), 2)]),
        loose: HashMap::from([("zzz".into(), 3)]),
        note: Some(Box::new("remember".into())),
        flag: Some(true),
    };
    let out = engine.write_string(&bag).unwrap();
    let mut copy = Bag::default();
    engine.read_str(&mut copy, &out).unwrap();
    assert_eq!(copy, bag);
}

#[test]
fn empty_containers_write_compact_forms() {
    let reg = bag_registry();
    let mut engine = Engine::new(&reg);
    let out = engine.write_string(&Bag::default()).unwrap();
    assert!(out.contains("\"names\": []"));
    assert!(out.contains("\"ranks\": {}"));
    assert!(out.contains("\"note\": null"));
    assert!(out.contains("\"flag\": null"));
}

#[test]
fn maps_merge_and_overwrite_on_read() {
    let reg = bag_registry();
    let mut engine = Engine::new(&reg);
    let mut bag = Bag {
        ranks: BTreeMap::from([("a".into(), 1), ("keep".into(), 9)]),
        ..Bag::default()
    };
    let doc = "{\"ranks\": {\"a\": 5, \"b\": 2}}";
    engine.read_str(&mut bag, doc).unwrap();
    assert_eq!(bag.ranks.get("a"), Some(&5));
    assert_eq!(bag.ranks.get("b"), Some(&2));
    assert_eq!(bag.ranks.get("keep"), Some(&9));
}

#[test]
fn map_keys_may_not_start_with_at() {
    let reg = bag_registry();
    let mut engine = Engine::new(&reg);
    let mut bag = Bag::default();
    let err = engine
        .read_str(&mut bag, "{\"ranks\": {\"@class\": 1}}")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::WrongKeyword);
}

#[test]
fn fixed_array_overflow_is_reported() {
    let reg = bag_registry();
    let mut engine = Engine::new(&reg);
    let mut bag = Bag::default();
    let doc = "{\"fixed\": [\"a\", \"b\", \"c\", \"d\"]}";
    let err = engine.read_str(&mut bag, doc).unwrap_err();
    assert_eq!(err.kind, ErrorKind::CantAddToArray);
}

// - - - enums and scalars - - -

#[test]
fn enums_are_integer_coded() {
    let reg = phone_registry();
    let mut engine = Engine::new(&reg);
    assert_eq!(engine.write_string(&Gender::Female).unwrap(), "2\n");
    let mut gender = Gender::Unknown;
    engine.read_str(&mut gender, "1").unwrap();
    assert_eq!(gender, Gender::Male);
    let err = engine.read_str(&mut gender, "9").unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidValue);
}

#[test]
fn malformed_scalars_are_annotated_with_the_member() {
    let reg = node_registry();
    let mut engine = Engine::new(&reg);
    let mut node = Node::default();
    let err = engine
        .read_str(&mut node, "{\"v\": \"abc\", \"next\": null}")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidValue);
    assert!(err.detail.contains("for member 'v'"), "{}", err.detail);
}

#[test]
fn strings_escape_and_round_trip() {
    let reg = phone_registry();
    let mut engine = Engine::new(&reg);
    let phone = Phone {
        kind: "a\"b\\c\n\t".into(),
        number: "1".into(),
    };
    let out = engine.write_string(&phone).unwrap();
    assert!(out.contains("\"a\\\"b\\\\c\\n\\t\""));
    let mut copy = Phone::default();
    engine.read_str(&mut copy, &out).unwrap();
    assert_eq!(copy, phone);
}

// - - - inheritance - - -

#[test]
fn inherited_members_write_base_first_and_read_through_upcasts() {
    let reg = contact_registry();
    let mut engine = Engine::new(&reg);
    let pc = PhotoContact {
        contact: Contact {
            first: "John".into(),
            last: "Smith".into(),
            age: 38,
            ..Contact::default()
        },
        photo: Photo {
            image: "john.png".into(),
            width: 75,
            height: 50,
        },
    };
    let out = engine.write_string(&pc).unwrap();
    let first = out.find("\"first\"").unwrap();
    let image = out.find("\"image\"").unwrap();
    assert!(first < image, "contact members precede photo members");

    let mut copy = PhotoContact::default();
    engine.read_str(&mut copy, &out).unwrap();
    assert_eq!(copy.contact.first, "John");
    assert_eq!(copy.contact.age, 38);
    assert_eq!(copy.photo.image, "john.png");
    assert_eq!(copy.photo.width, 75);
}

#[test]
fn family_graph_round_trips_with_identity() {
    let reg = contact_registry();
    let mut engine = Engine::new(&reg);
    engine.set_sharing(true);
    let bessie = build_family();
    let out = engine.write_string(&bessie).unwrap();
    assert!(out.contains("\"@class\": \"PhotoContact\""));

    let mut copy = Obj::new(PhotoContact::default());
    engine.read_str(&mut copy, &out).unwrap();

    // partner cycle: bessie -> john -> bessie
    let john = copy
        .borrow()
        .contact
        .partner
        .clone()
        .unwrap()
        .downcast::<PhotoContact>()
        .unwrap();
    let back = john
        .borrow()
        .contact
        .partner
        .clone()
        .unwrap()
        .downcast::<PhotoContact>()
        .unwrap();
    assert!(back.ptr_eq(&copy));

    // the home phone is one shared object across all three contacts
    let bessie_home = copy.borrow().contact.phones[0].clone();
    let john_home = john.borrow().contact.phones[0].clone();
    assert!(bessie_home.ptr_eq(&john_home));
    let laura = copy.borrow().contact.children[0]
        .downcast::<Contact>()
        .unwrap();
    assert!(laura.borrow().phones[0].ptr_eq(&bessie_home));

    // both parents point at the same child object
    assert!(copy.borrow().contact.children[0].ptr_eq(&john.borrow().contact.children[0]));

    assert_eq!(john.borrow().photo.image, "john.png");
    assert_eq!(laura.borrow().age, 6);
}

#[test]
fn rewriting_a_reread_graph_is_byte_identical() {
    let reg = contact_registry();
    let mut engine = Engine::new(&reg);
    engine.set_sharing(true);
    let bessie = build_family();
    let first = engine.write_string(&bessie).unwrap();
    let mut copy = Obj::new(PhotoContact::default());
    engine.read_str(&mut copy, &first).unwrap();
    let second = engine.write_string(&copy).unwrap();
    assert_eq!(first, second);
}

// - - - member variants - - -

#[derive(Debug, Default)]
struct Celsius {
    degrees: f64,
}

defobject!(Celsius);

#[test]
fn accessor_pair_members_use_temporaries() {
    let mut reg = Registry::new();
    reg.defclass::<Celsius>("Celsius").member_with(
        "degrees",
        |c: &mut Celsius, v: f64| c.degrees = v,
        |c: &Celsius| c.degrees,
    );
    let mut engine = Engine::new(&reg);
    let out = engine.write_string(&Celsius { degrees: 21.5 }).unwrap();
    assert_eq!(out, "{\n  \"degrees\": 21.5\n}\n");
    let mut copy = Celsius::default();
    engine.read_str(&mut copy, &out).unwrap();
    assert_eq!(copy.degrees, 21.5);
}

thread_local! {
    static GLOBAL_VAR: Cell<i64> = const { Cell::new(55) };
}

fn get_global() -> i64 {
    GLOBAL_VAR.with(Cell::get)
}

fn set_global(v: i64) {
    GLOBAL_VAR.with(|g| g.set(v));
}

#[test]
fn static_members_repeat_in_every_instance() {
    let mut reg = Registry::new();
    reg.defclass::<Phone>("Phone")
        .member_static("global", get_global, set_global)
        .member("number", |p: &Phone| &p.number, |p: &mut Phone| &mut p.number);
    let mut engine = Engine::new(&reg);

    set_global(55);
    let phones = vec![
        Phone {
            number: "1".into(),
            ..Phone::default()
        },
        Phone {
            number: "2".into(),
            ..Phone::default()
        },
    ];
    let out = engine.write_string(&phones).unwrap();
    assert_eq!(out.matches("\"global\": 55").count(), 2);

    engine
        .read_str(&mut Phone::default(), "{\"global\": 77, \"number\": \"9\"}")
        .unwrap();
    assert_eq!(get_global(), 77);
}

#[test]
fn custom_members_emit_their_own_name() {
    let mut reg = Registry::new();
    reg.defclass::<Celsius>("Celsius").member_custom(
        "degrees",
        |c: &mut Celsius, r: &mut Reader<'_>, token: &Token| r.read_value(&mut c.degrees, token),
        |c: &Celsius, w: &mut Writer<'_>| w.write_member(&c.degrees),
    );
    let mut engine = Engine::new(&reg);
    let out = engine.write_string(&Celsius { degrees: 3.5 }).unwrap();
    assert_eq!(out, "{\n  \"degrees\": 3.5\n}\n");
    let mut copy = Celsius::default();
    engine.read_str(&mut copy, &out).unwrap();
    assert_eq!(copy.degrees, 3.5);
}

#[derive(Debug, Default, PartialEq)]
struct Preset {
    mode: i32,
    label: String,
    value: i32,
}

defobject!(Preset);

// the label is only written when set
fn label_read(p: &mut Preset, r: &mut Reader<'_>, token: &Token) -> crate::Result<()> {
    r.read_value(&mut p.label, token)
}

fn label_write(p: &Preset, w: &mut Writer<'_>) -> crate::Result<()> {
    if p.label.is_empty() {
        Ok(())
    } else {
        w.write_member(&p.label)
    }
}

#[test]
fn custom_members_may_emit_nothing() {
    let mut reg = Registry::new();
    reg.defclass::<Preset>("Preset")
        .member("mode", |p: &Preset| &p.mode, |p: &mut Preset| &mut p.mode)
        .member_custom("label", label_read, label_write)
        .member("value", |p: &Preset| &p.value, |p: &mut Preset| &mut p.value);
    let mut engine = Engine::new(&reg);

    let silent = Preset {
        mode: 1,
        label: String::new(),
        value: 4,
    };
    let out = engine.write_string(&silent).unwrap();
    assert_eq!(out, "{\n  \"mode\": 1,\n  \"value\": 4\n}\n");
    let mut copy = Preset::default();
    engine.read_str(&mut copy, &out).unwrap();
    assert_eq!(copy, silent);
    assert_eq!(engine.write_string(&copy).unwrap(), out);

    let labeled = Preset {
        mode: 1,
        label: "fast".into(),
        value: 7,
    };
    let out = engine.write_string(&labeled).unwrap();
    assert_eq!(
        out,
        "{\n  \"mode\": 1,\n  \"label\": \"fast\",\n  \"value\": 7\n}\n"
    );
    let mut copy = Preset::default();
    engine.read_str(&mut copy, &out).unwrap();
    assert_eq!(copy, labeled);
    assert_eq!(engine.write_string(&copy).unwrap(), out);
}

#[test]
fn trailing_silent_custom_member_leaves_no_dangling_comma() {
    let mut reg = Registry::new();
    reg.defclass::<Preset>("Preset")
        .member("value", |p: &Preset| &p.value, |p: &mut Preset| &mut p.value)
        .member_custom("label", label_read, label_write);
    let mut engine = Engine::new(&reg);

    let silent = Preset {
        mode: 0,
        label: String::new(),
        value: 4,
    };
    let out = engine.write_string(&silent).unwrap();
    assert_eq!(out, "{\n  \"value\": 4\n}\n");
    let mut copy = Preset::default();
    engine.read_str(&mut copy, &out).unwrap();
    assert_eq!(copy, silent);
    assert_eq!(engine.write_string(&copy).unwrap(), out);
}

// a pointee class with no usable default construction
#[derive(Debug)]
struct Sim {
    id: String,
}

defobject!(Sim);

#[derive(Debug, Default)]
struct Roster {
    leader: Option<Obj<Sim>>,
    team: Vec<Obj<Sim>>,
}

defobject!(Roster);

fn roster_registry() -> Registry {
    let mut reg = Registry::new();
    reg.defclass_with::<Sim>("Sim", None)
        .member("id", |s: &Sim| &s.id, |s: &mut Sim| &mut s.id);
    reg.defclass::<Roster>("Roster")
        .member_created(
            "leader",
            |r: &Roster| &r.leader,
            |r: &mut Roster| &mut r.leader,
            |_r: &mut Roster| Obj::new(Sim { id: String::new() }),
        )
        .member_created(
            "team",
            |r: &Roster| &r.team,
            |r: &mut Roster| &mut r.team,
            |_r: &mut Roster| Obj::new(Sim { id: String::new() }),
        );
    reg
}

#[test]
fn member_creators_materialize_pointees_and_elements() {
    let reg = roster_registry();
    let mut engine = Engine::new(&reg);
    let mut roster = Roster::default();
    let doc = "{\"leader\": {\"id\": \"a\"}, \"team\": [{\"id\": \"b\"}, {\"id\": \"c\"}]}";
    engine.read_str(&mut roster, doc).unwrap();
    assert_eq!(roster.leader.unwrap().borrow().id, "a");
    assert_eq!(roster.team.len(), 2);
    assert_eq!(roster.team[1].borrow().id, "c");
}

#[test]
fn without_a_creator_an_abstract_pointee_fails() {
    let mut reg = Registry::new();
    reg.defclass_with::<Sim>("Sim", None)
        .member("id", |s: &Sim| &s.id, |s: &mut Sim| &mut s.id);
    reg.defclass::<Roster>("Roster")
        .member(
            "leader",
            |r: &Roster| &r.leader,
            |r: &mut Roster| &mut r.leader,
        )
        .member("team", |r: &Roster| &r.team, |r: &mut Roster| &mut r.team);
    let mut engine = Engine::new(&reg);
    let mut roster = Roster::default();
    let err = engine
        .read_str(&mut roster, "{\"leader\": {\"id\": \"a\"}}")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AbstractClass);
}

thread_local! {
    static READS: Cell<u32> = const { Cell::new(0) };
    static WRITES: Cell<u32> = const { Cell::new(0) };
}

#[test]
fn post_hooks_fire_once_per_object() {
    let mut reg = Registry::new();
    reg.defclass::<Phone>("Phone")
        .member("number", |p: &Phone| &p.number, |p: &mut Phone| &mut p.number)
        .postread(|_p: &mut Phone| READS.with(|c| c.set(c.get() + 1)))
        .postwrite(|_p: &Phone| WRITES.with(|c| c.set(c.get() + 1)));
    let mut engine = Engine::new(&reg);
    READS.with(|c| c.set(0));
    WRITES.with(|c| c.set(0));

    let phones = vec![Phone::default(), Phone::default()];
    let out = engine.write_string(&phones).unwrap();
    assert_eq!(WRITES.with(Cell::get), 2);

    let mut copy: Vec<Phone> = Vec::new();
    engine.read_str(&mut copy, &out).unwrap();
    assert_eq!(READS.with(Cell::get), 2);
}

// - - - errors and registry misuse - - -

#[test]
fn redefined_class_is_sticky_and_blocks_engines() {
    let mut reg = Registry::new();
    reg.defclass::<Phone>("Phone");
    reg.defclass::<Address>("Phone");
    assert_eq!(reg.error().unwrap().kind, ErrorKind::RedefinedClass);

    let mut engine = Engine::new(&reg);
    let err = engine.write_string(&Phone::default()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::RedefinedClass);
}

#[test]
fn redefined_member_is_rejected() {
    let mut reg = Registry::new();
    reg.defclass::<Phone>("Phone")
        .member("number", |p: &Phone| &p.number, |p: &mut Phone| &mut p.number)
        .member("number", |p: &Phone| &p.kind, |p: &mut Phone| &mut p.kind);
    assert_eq!(reg.error().unwrap().kind, ErrorKind::RedefinedMember);
}

#[test]
fn member_shadowing_a_superclass_member_is_rejected() {
    let mut reg = Registry::new();
    reg.defclass::<ShapeData>("Shape")
        .member("x", |s: &ShapeData| &s.x, |s: &mut ShapeData| &mut s.x);
    reg.defclass::<CircleData>("Circle")
        .extends::<ShapeData>(
            |c: &CircleData| &c.shape,
            |c: &mut CircleData| &mut c.shape,
        )
        .member("x", |c: &CircleData| &c.y, |c: &mut CircleData| &mut c.y);
    assert_eq!(reg.error().unwrap().kind, ErrorKind::RedefinedMember);
}

#[test]
fn unknown_and_repeated_superclasses_are_rejected() {
    let mut reg = Registry::new();
    reg.defclass::<CircleData>("Circle").extends::<ShapeData>(
        |c: &CircleData| &c.shape,
        |c: &mut CircleData| &mut c.shape,
    );
    assert_eq!(reg.error().unwrap().kind, ErrorKind::UnknownSuperclass);

    let mut reg = Registry::new();
    reg.defclass::<ShapeData>("Shape");
    reg.defclass::<CircleData>("Circle")
        .extends::<ShapeData>(
            |c: &CircleData| &c.shape,
            |c: &mut CircleData| &mut c.shape,
        )
        .extends::<ShapeData>(
            |c: &CircleData| &c.shape,
            |c: &mut CircleData| &mut c.shape,
        );
    assert_eq!(reg.error().unwrap().kind, ErrorKind::RedefinedSuperclass);
}

#[test]
fn unresolved_back_reference_is_invalid() {
    let reg = node_registry();
    let mut engine = Engine::new(&reg);
    engine.set_sharing(true);
    let mut node = Node::default();
    let err = engine
        .read_str(&mut node, "{\"v\": 1, \"next\": \"@7\"}")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidId);
}

#[test]
fn unknown_at_keyword_is_rejected() {
    let reg = phone_registry();
    let mut engine = Engine::new(&reg);
    let mut phone = Phone::default();
    let err = engine
        .read_str(&mut phone, "{\"@foo\": \"1\"}")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::WrongKeyword);
}

#[test]
fn unknown_class_tag_is_rejected() {
    let reg = node_registry();
    let mut engine = Engine::new(&reg);
    let mut copy: Option<Obj<Node>> = None;
    let err = engine
        .read_str(&mut copy, "{\"@class\": \"Ghost\", \"v\": 1}")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownClass);
}

#[test]
fn unknown_member_with_nested_value_skips_the_whole_subtree() {
    let reg = phone_registry();
    let (mut engine, errors) = collecting_engine(&reg);
    let mut phone = Phone::default();
    let doc = "{\"extra\": {\"deep\": [1, 2], \"more\": {\"x\": 1}}, \"type\": \"home\", \"number\": \"1\"}";
    assert!(engine.read_str(&mut phone, doc).is_err());
    assert_eq!(phone.kind, "home");
    assert_eq!(phone.number, "1");
    assert_eq!(errors.borrow().len(), 1);
}

#[test]
fn empty_document_is_no_data() {
    let reg = phone_registry();
    let mut engine = Engine::new(&reg);
    let mut phone = Phone::default();
    let err = engine.read_str(&mut phone, "   \n  ").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NoData);
}

#[test]
fn truncated_object_is_premature_eof() {
    let reg = phone_registry();
    let mut engine = Engine::new(&reg);
    let mut phone = Phone::default();
    let err = engine
        .read_str(&mut phone, "{\"type\": \"home\",")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::PrematureEof);
}

#[test]
fn errors_carry_stream_name_and_line() {
    let reg = phone_registry();
    let mut engine = Engine::new(&reg);
    let mut phone = Phone::default();
    let doc = "{\n\"type\": \"home\",\n\"bad\nline";
    let err = engine
        .read_named(&mut phone, doc.as_bytes(), "phones.json", 1)
        .unwrap_err();
    assert_eq!(err.stream, "phones.json");
    assert!(err.line >= 3, "line was {}", err.line);
    let text = err.to_string();
    assert!(text.contains("phones.json"), "{}", text);
}

// - - - files - - -

#[test]
fn file_round_trip() {
    let reg = contact_registry();
    let mut engine = Engine::new(&reg);
    engine.set_sharing(true);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contacts.json");

    let bessie = build_family();
    engine.write_file(&bessie, &path).unwrap();
    let mut copy = Obj::new(PhotoContact::default());
    engine.read_file(&mut copy, &path).unwrap();
    assert_eq!(copy.borrow().contact.first, "Bessie");
    assert_eq!(
        engine.write_string(&bessie).unwrap(),
        engine.write_string(&copy).unwrap()
    );
}

#[test]
fn missing_file_reports_cant_read_file() {
    let reg = phone_registry();
    let mut engine = Engine::new(&reg);
    let mut phone = Phone::default();
    let err = engine
        .read_file(&mut phone, "/nonexistent/phones.json")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::CantReadFile);
    assert!(err.stream.contains("phones.json"));
}
