use rand::{rngs::StdRng, SeedableRng};
use tokenseed::{
  rng::Rng,
  sampler::{sample_sequence, SampleCall, SampleValue},
  token_hash::{TokenData, TokenHash},
};

/// Second implementation on unsigned words, emulating the signed right shift by hand.
struct UnsignedXorshift(u64);

impl UnsignedXorshift {
  fn next_fraction(&mut self) -> f64 {
    let mut x = self.0;
    x ^= x << 13;
    let sign_fill = if x >> 63 == 1 { !(u64::MAX >> 17) } else { 0 };
    x ^= (x >> 17) | sign_fill;
    x ^= x << 5;
    self.0 = x;
    let magnitude = if x >> 63 == 1 { x.wrapping_neg() } else { x };
    (magnitude % 1000) as f64 / 1000.0
  }
}

#[test]
fn first_three_fractions_for_known_hash() {
  let text = "0x11ac128f8b549490e4f0e5d0c1b2a3948576a6b7c8d9e0f1021324354657687";
  let hash = TokenHash::parse(text).unwrap();
  let mut rng = Rng::new_from_token_hash(&hash);
  assert_eq!(
    [rng.next_fraction(), rng.next_fraction(), rng.next_fraction()],
    [0.325, 0.377, 0.4]
  );
}

#[test]
fn matches_unsigned_reimplementation() {
  let mut seeds = StdRng::seed_from_u64(42);
  for _ in 0..500 {
    let hash = TokenHash::random(&mut seeds);
    let mut rng = Rng::new_from_token_hash(&hash);
    let mut other = UnsignedXorshift(u64::from_str_radix(&hash.digits()[..16], 16).unwrap());
    for _ in 0..100 {
      assert_eq!(rng.next_fraction(), other.next_fraction(), "hash {}", hash);
    }
  }
}

#[test]
fn same_hash_same_artwork_parameters() {
  let mut source = StdRng::seed_from_u64(9);
  let token = TokenData::random(3, &mut source).unwrap();
  let palette = ["#0b132b", "#1c2541", "#3a506b", "#5bc0be", "#6fffe9"];

  let render = |hash: &TokenHash| {
    let mut rng = Rng::new_from_token_hash(hash);
    let shapes = rng.int_between(3, 12);
    let mut out = Vec::new();
    for _ in 0..shapes {
      out.push((
        rng.between(0.0, 800.0),
        rng.between(0.0, 800.0),
        *rng.choose(&palette).unwrap(),
        rng.chance(0.2),
      ));
    }
    out
  };

  let first = render(&token.hash);
  let second = render(&TokenHash::parse(token.hash.as_str()).unwrap());
  assert_eq!(first, second);
  assert!((3..=12).contains(&first.len()));
}

#[test]
fn distinct_hashes_usually_diverge() {
  let mut source = StdRng::seed_from_u64(11);
  let mut identical = 0;
  for _ in 0..100 {
    let a = TokenHash::random(&mut source);
    let b = TokenHash::random(&mut source);
    let mut ra = Rng::new_from_token_hash(&a);
    let mut rb = Rng::new_from_token_hash(&b);
    let sa: Vec<f64> = (0..10).map(|_| ra.next_fraction()).collect();
    let sb: Vec<f64> = (0..10).map(|_| rb.next_fraction()).collect();
    if sa == sb {
      identical += 1;
    }
  }
  assert_eq!(identical, 0);
}

#[test]
fn trace_from_json_calls() {
  let calls: Vec<SampleCall> = serde_json::from_str(
    r#"[
      {"kind":"nextFraction"},
      {"kind":"between","low":10,"high":20},
      {"kind":"chance","probability":0.5}
    ]"#,
  )
  .unwrap();
  let hash = TokenHash::parse("11ac128f8b549490").unwrap();
  let trace = sample_sequence(&hash, &calls, 16).unwrap();
  assert_eq!(trace.seed, 1273413202366207120);
  assert_eq!(trace.values[0], SampleValue::Fraction { value: 0.325 });
  match trace.values[1] {
    SampleValue::Float { value } => assert!((value - 13.77).abs() < 1e-9),
    ref other => panic!("unexpected value {:?}", other),
  }
  // Third fraction is 0.4.
  assert_eq!(trace.values[2], SampleValue::Bool { value: true });

  let json = serde_json::to_value(&trace).unwrap();
  assert_eq!(json["seed"], 1273413202366207120i64);
  assert_eq!(json["values"][0]["kind"], "fraction");
}
