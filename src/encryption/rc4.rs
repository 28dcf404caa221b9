use super::DecryptionError;

#[derive(Clone)]
pub struct Rc4 {
    initial_state: [u8; 256],
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    pub fn new<Key: AsRef<[u8]>>(key: Key) -> Result<Self, DecryptionError> {
        let key = key.as_ref();
        if key.is_empty() || key.len() > 256 {
            return Err(DecryptionError::InvalidKeyLength);
        }

        let mut initial_state = [0_u8; 256];
        for (i, v) in initial_state.iter_mut().enumerate() {
            *v = i as u8;
        }

        let mut j = 0_u8;
        for i in 0..256 {
            j = j.wrapping_add(initial_state[i]).wrapping_add(key[i % key.len()]);
            initial_state.swap(i, j as usize);
        }

        Ok(Self {
            initial_state,
            state: initial_state,
            i: 0,
            j: 0,
        })
    }

    /// XORs the next `data.len()` keystream bytes into `data`. The keystream
    /// continues where the previous call stopped.
    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        for byte in data {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.state[self.i as usize]);
            self.state.swap(self.i as usize, self.j as usize);
            let index = self.state[self.i as usize].wrapping_add(self.state[self.j as usize]);
            *byte ^= self.state[index as usize];
        }
    }

    /// Restarts the keystream.
    pub fn reset(&mut self) {
        self.state = self.initial_state;
        self.i = 0;
        self.j = 0;
    }

    /// Decrypts `input` from the start of the keystream.
    pub fn decrypt<Input: AsRef<[u8]>>(&self, input: Input) -> Vec<u8> {
        let mut output = input.as_ref().to_vec();
        let mut cipher = self.clone();
        cipher.reset();
        cipher.apply_keystream(&mut output);
        output
    }

    /// RC4 is symmetric.
    pub fn encrypt<Input: AsRef<[u8]>>(&self, input: Input) -> Vec<u8> {
        self.decrypt(input)
    }
}
